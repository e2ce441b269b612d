// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::db::Database;
use crate::error::Fallible;
use crate::session::controller::Envelope;
use crate::types::card::OwnerId;
use crate::worker::SessionWorkers;

type Workers = SessionWorkers<Database>;

type Reply = Result<Json<Envelope>, (StatusCode, String)>;

pub async fn start_server(config: Config) -> Fallible<()> {
    let db = Database::new(config.database_path()?)?;
    let listener = TcpListener::bind(&config.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    serve(listener, db, shutdown_signal()).await
}

/// Serves sessions on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    db: Database,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Fallible<()> {
    let app = Router::new();
    let app = app.route("/sessions/{owner}", get(current).post(command));
    let app = app.fallback(not_found_handler);
    let app = app.with_state(SessionWorkers::new(db));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    log::info!("Server stopped.");
    Ok(())
}

async fn current(State(workers): State<Workers>, Path(owner): Path<String>) -> Reply {
    reply(workers.current(OwnerId::new(owner)).await)
}

async fn command(
    State(workers): State<Workers>,
    Path(owner): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    reply(workers.command(OwnerId::new(owner), body).await)
}

fn reply(result: Fallible<Envelope>) -> Reply {
    match result {
        Ok(envelope) => Ok(Json(envelope)),
        Err(e) => {
            log::error!("{e}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn not_found_handler() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Not Found".to_string())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutting down."),
        Err(e) => {
            log::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
