// Copyright 2026 Bifrost Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use bifrost::service::build_router;
use bifrost_handlers::HandlerState;
use bifrost_signing_backends::TssClient;
use bifrost_types::RpcUrl;
use bifrost_utils::http::RetryHttpClient;
use bifrost_utils::metric::Metrics;
use bifrost_utils::retry::ExponentialWithMaxRetryCount;

fn serve(router: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(server);
    addr
}

fn state() -> Arc<HandlerState> {
    let tss = TssClient::new(
        RpcUrl::parse("http://127.0.0.1:1").unwrap(),
        RetryHttpClient::new(reqwest::Client::new()).with_policy(
            ExponentialWithMaxRetryCount::new(
                backoff::ExponentialBackoff {
                    initial_interval: Duration::from_millis(1),
                    max_interval: Duration::from_millis(2),
                    ..Default::default()
                },
                1,
            ),
        ),
    );
    HandlerState::new(Arc::new(Metrics::new().unwrap()), tss, "16Uiu2HAm")
}

#[tokio::test]
async fn metrics_are_only_served_when_enabled() {
    let with = serve(build_router(state(), true));
    let without = serve(build_router(state(), false));

    let response = reqwest::get(format!("http://{with}/metrics")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let response = reqwest::get(format!("http://{without}/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    for addr in [with, without] {
        let response = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}

#[tokio::test]
async fn p2p_id_is_always_routed() {
    let addr = serve(build_router(state(), false));
    let response = reqwest::get(format!("http://{addr}/p2pid")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "16Uiu2HAm");
}
