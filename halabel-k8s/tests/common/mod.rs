//! In-process stand-in for the Kubernetes API server.
//!
//! Serves GET and JSON-Patch PATCH on pods kept as raw JSON, enforces a
//! bearer token, and can be told to answer the next requests with a fixed
//! status.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use halabel_k8s::{CredentialSource, Credentials, K8sClient, K8sError};

pub const TEST_NAMESPACE: &str = "default";
pub const TEST_POD_NAME: &str = "shell-demo";
pub const TEST_TOKEN: &str = "test-token";

/// What the server saw for one request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct ServerState {
    pods: Mutex<HashMap<(String, String), Value>>,
    accepted_token: Mutex<String>,
    injected: Mutex<VecDeque<StatusCode>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct FakeApiServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl FakeApiServer {
    /// Start a server holding one pod with an empty label map
    pub async fn start() -> Self {
        let server = Self::empty().await;
        server.add_pod(
            TEST_NAMESPACE,
            TEST_POD_NAME,
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": TEST_POD_NAME,
                    "namespace": TEST_NAMESPACE,
                    "labels": {}
                },
                "spec": {"containers": [{"name": "nginx", "image": "nginx"}]}
            }),
        );
        server
    }

    /// Start a server holding no pods
    pub async fn empty() -> Self {
        let state = Arc::new(ServerState::default());
        *state.accepted_token.lock().unwrap() = TEST_TOKEN.to_string();

        let app = Router::new()
            .route(
                "/api/v1/namespaces/:namespace/pods/:name",
                get(get_pod).patch(patch_pod),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn add_pod(&self, namespace: &str, name: &str, doc: Value) {
        self.state
            .pods
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), doc);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Value> {
        self.state
            .pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Labels of the default test pod
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.pod(TEST_NAMESPACE, TEST_POD_NAME)
            .and_then(|pod| pod["metadata"]["labels"].as_object().cloned())
            .map(|labels| {
                labels
                    .into_iter()
                    .map(|(k, v)| (k, v.as_str().unwrap_or_default().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Only this token is accepted from now on
    pub fn set_accepted_token(&self, token: &str) {
        *self.state.accepted_token.lock().unwrap() = token.to_string();
    }

    /// Answer the next request with `status` instead of handling it
    pub fn inject_status(&self, status: StatusCode) {
        self.state.injected.lock().unwrap().push_back(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn patch_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::PATCH)
            .collect()
    }

    /// A client pointed at this server, authenticated with [`TEST_TOKEN`]
    pub async fn client(&self) -> (Arc<K8sClient>, Arc<TestCredentials>) {
        let source = Arc::new(TestCredentials::new(&self.url(), TEST_TOKEN));
        let client = K8sClient::with_source(source.clone()).await.unwrap();
        (Arc::new(client), source)
    }
}

impl Drop for FakeApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Credential source whose token can be rotated by the test
pub struct TestCredentials {
    api_server: String,
    token: Mutex<String>,
    loads: AtomicUsize,
}

impl TestCredentials {
    pub fn new(api_server: &str, token: &str) -> Self {
        Self {
            api_server: api_server.to_string(),
            token: Mutex::new(token.to_string()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = token.to_string();
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for TestCredentials {
    async fn load(&self) -> Result<Credentials, K8sError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let token = self.token.lock().unwrap().clone();
        Ok(Credentials::new(self.api_server.clone(), token, None))
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Record the request and decide whether it gets past injection and auth
fn admit(
    state: &ServerState,
    method: Method,
    namespace: &str,
    name: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Response> {
    let authorization = header_value(headers, header::AUTHORIZATION);
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: format!("/api/v1/namespaces/{}/pods/{}", namespace, name),
        authorization: authorization.clone(),
        accept: header_value(headers, header::ACCEPT),
        content_type: header_value(headers, header::CONTENT_TYPE),
        body: body.to_vec(),
    });

    if let Some(status) = state.injected.lock().unwrap().pop_front() {
        return Err((status, "injected failure").into_response());
    }

    let expected = format!("Bearer {}", state.accepted_token.lock().unwrap());
    if authorization.as_deref() != Some(expected.as_str()) {
        return Err(status_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(())
}

fn status_response(code: StatusCode, message: &str) -> Response {
    (
        code,
        Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": message,
            "code": code.as_u16()
        })),
    )
        .into_response()
}

async fn get_pod(
    State(state): State<Arc<ServerState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = admit(&state, Method::GET, &namespace, &name, &headers, &[]) {
        return response;
    }

    match state.pods.lock().unwrap().get(&(namespace, name.clone())) {
        Some(pod) => Json(pod.clone()).into_response(),
        None => status_response(
            StatusCode::NOT_FOUND,
            &format!("pods \"{}\" not found", name),
        ),
    }
}

async fn patch_pod(
    State(state): State<Arc<ServerState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = admit(&state, Method::PATCH, &namespace, &name, &headers, &body) {
        return response;
    }

    if header_value(&headers, header::CONTENT_TYPE).as_deref()
        != Some("application/json-patch+json")
    {
        return status_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported patch type");
    }

    let operations: Vec<Value> = match serde_json::from_slice(&body) {
        Ok(ops) => ops,
        Err(e) => return status_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let mut pods = state.pods.lock().unwrap();
    let Some(pod) = pods.get_mut(&(namespace, name.clone())) else {
        return status_response(
            StatusCode::NOT_FOUND,
            &format!("pods \"{}\" not found", name),
        );
    };

    // The whole document applies or nothing does.
    let mut patched = pod.clone();
    for operation in &operations {
        if let Err(message) = apply_operation(&mut patched, operation) {
            return status_response(StatusCode::UNPROCESSABLE_ENTITY, &message);
        }
    }
    *pod = patched.clone();

    Json(patched).into_response()
}

fn apply_operation(doc: &mut Value, operation: &Value) -> Result<(), String> {
    let op = operation["op"].as_str().ok_or("missing op")?;
    let path = operation["path"].as_str().ok_or("missing path")?;
    let value = operation.get("value").cloned().ok_or("missing value")?;

    let mut tokens: Vec<String> = path
        .strip_prefix('/')
        .ok_or_else(|| format!("invalid path {:?}", path))?
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect();
    let last = tokens.pop().ok_or("empty path")?;

    let mut parent = doc;
    for token in &tokens {
        parent = parent
            .get_mut(token.as_str())
            .ok_or_else(|| format!("doc is missing path: {:?}", path))?;
    }
    let parent = parent
        .as_object_mut()
        .ok_or_else(|| format!("parent of {:?} is not an object", path))?;

    match op {
        "add" => {
            parent.insert(last, value);
            Ok(())
        }
        "replace" => {
            if !parent.contains_key(&last) {
                return Err(format!("replace operation does not apply: doc is missing key: {:?}", path));
            }
            parent.insert(last, value);
            Ok(())
        }
        other => Err(format!("unsupported op {:?}", other)),
    }
}
