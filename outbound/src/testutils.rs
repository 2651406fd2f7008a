use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One scripted answer of the test endpoint.
#[derive(Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: &'static str,
    pub delay: Duration,
}

impl Reply {
    pub fn new(status: u16, body: &'static str) -> Self {
        Reply {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

/// An RGBridge stand-in on `127.0.0.1:0`. The n-th request gets the n-th
/// reply; once the script runs out the last reply repeats.
pub struct TestEndpoint {
    pub url: url::Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestEndpoint {
    pub async fn spawn(script: Vec<Reply>) -> TestEndpoint {
        assert!(!script.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let recorded = recorded.clone();
                let script = script.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = recorded.clone();
                        let script = script.clone();
                        async move {
                            let header = |name: &str| {
                                req.headers()
                                    .get(name)
                                    .and_then(|v| v.to_str().ok())
                                    .map(String::from)
                            };
                            let content_type = header("content-type");
                            let authorization = header("authorization");
                            let body = req.into_body().collect().await.unwrap().to_bytes();

                            let reply = {
                                let mut recorded = recorded.lock().unwrap();
                                recorded.push(RecordedRequest {
                                    content_type,
                                    authorization,
                                    body: body.to_vec(),
                                });
                                let index = (recorded.len() - 1).min(script.len() - 1);
                                script[index].clone()
                            };

                            tokio::time::sleep(reply.delay).await;
                            let mut response = Response::new(Full::new(Bytes::from(reply.body)));
                            *response.status_mut() = reply.status;
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        TestEndpoint {
            url: url::Url::parse(&format!("http://127.0.0.1:{port}/rgbridge")).unwrap(),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}
