//! In-process socket server speaking both socket transports.
//!
//! `/ws` is the legacy pub/sub endpoint: every `sub <topic>` is answered with
//! `ack <topic>` followed by `pub <topic>`. `/secure/:name` greets with
//! `hello <name>` as soon as the socket opens.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Path;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use conformance_notifications::{Url, PROTOCOL};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct SocketServer {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl SocketServer {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/ws", get(pubsub))
            .route("/secure/:name", get(secure));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, task }
    }

    pub fn url(&self, scheme: &str, path: &str) -> Url {
        format!("{scheme}://{}{path}", self.addr).parse().unwrap()
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn pubsub(ws: WebSocketUpgrade) -> Response {
    ws.protocols([PROTOCOL]).on_upgrade(|mut socket: WebSocket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            let Message::Text(text) = message else {
                continue;
            };

            let Some(topic) = text.strip_prefix("sub ") else {
                continue;
            };

            for reply in [format!("ack {topic}"), format!("pub {topic}")] {
                if socket.send(Message::Text(reply)).await.is_err() {
                    return;
                }
            }
        }
    })
}

async fn secure(Path(name): Path<String>, ws: WebSocketUpgrade) -> Response {
    ws.protocols([PROTOCOL])
        .on_upgrade(move |mut socket: WebSocket| async move {
            if socket
                .send(Message::Text(format!("hello {name}")))
                .await
                .is_err()
            {
                return;
            }

            while let Some(Ok(_)) = socket.recv().await {}
        })
}
