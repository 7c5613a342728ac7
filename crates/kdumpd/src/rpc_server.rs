//! RPC Server - Unix socket server for kdumpctl and management agents

use crate::error::KdumpError;
use crate::store::ConfigStore;
use anyhow::{Context, Result};
use kdump_common::rpc::{
    IndexParams, RpcMethod, RpcRequest, RpcResponse, SetConfigResult, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, PARSE_ERROR,
};
use kdump_common::KdumpConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Longest request line accepted, newline included
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// Bind the socket, replacing a stale one
pub async fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(dir) = socket_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .context("Failed to create socket directory")?;
    }

    let _ = tokio::fs::remove_file(socket_path).await;

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o660))?;
    }

    info!("RPC server listening on {}", socket_path.display());
    Ok(listener)
}

/// Accept connections until the task is dropped
pub async fn serve(listener: UnixListener, store: Arc<ConfigStore>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, store).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, store: Arc<ConfigStore>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = (&mut reader)
            .take(MAX_REQUEST_BYTES)
            .read_line(&mut line)
            .await
            .context("Failed to read from socket")?;

        if bytes_read == 0 {
            break;
        }
        if !line.ends_with('\n') && bytes_read as u64 >= MAX_REQUEST_BYTES {
            warn!("Request exceeds {} bytes, closing connection", MAX_REQUEST_BYTES);
            let response = RpcResponse::error(
                String::new(),
                INVALID_REQUEST,
                format!("request exceeds {} bytes", MAX_REQUEST_BYTES),
            );
            let response_json = serde_json::to_string(&response)? + "\n";
            writer
                .write_all(response_json.as_bytes())
                .await
                .context("Failed to write response")?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                debug!("RPC {:?} id={}", request.method, request.id);
                dispatch(request, Arc::clone(&store)).await
            }
            Err(e) => {
                warn!("Invalid request JSON: {}", e);
                RpcResponse::error(String::new(), PARSE_ERROR, e.to_string())
            }
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
    }

    Ok(())
}

/// Outcome of one method call before it becomes a response
enum Reply {
    Ok(Value),
    Failed(KdumpError),
    BadParams(String),
}

fn params<T: DeserializeOwned + Default>(raw: Option<Value>) -> std::result::Result<T, String> {
    match raw {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v).map_err(|e| e.to_string()),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Reply {
    match serde_json::to_value(value) {
        Ok(v) => Reply::Ok(v),
        Err(e) => Reply::Failed(e.into()),
    }
}

/// Run one request against the store; engine work runs off the reactor
async fn dispatch(request: RpcRequest, store: Arc<ConfigStore>) -> RpcResponse {
    let RpcRequest {
        id, method, params: raw, ..
    } = request;

    let reply = tokio::task::spawn_blocking(move || handle_method(method, raw, &store)).await;

    match reply {
        Ok(Reply::Ok(value)) => RpcResponse::success(id, value),
        Ok(Reply::Failed(e)) => {
            warn!("{:?} failed: {}", method, e);
            RpcResponse::error(id, e.code(), e.to_string())
        }
        Ok(Reply::BadParams(msg)) => RpcResponse::error(id, INVALID_PARAMS, msg),
        Err(e) => {
            error!("{:?} handler panicked: {}", method, e);
            RpcResponse::error(id, INTERNAL_ERROR, e.to_string())
        }
    }
}

fn handle_method(method: RpcMethod, raw: Option<Value>, store: &ConfigStore) -> Reply {
    match method {
        RpcMethod::Status => {
            let config = store.get();
            to_value(store.engine().status(&config))
        }

        RpcMethod::GetConfig => to_value(&*store.get()),

        RpcMethod::SetConfig => {
            let new: Option<KdumpConfig> = match raw {
                None | Some(Value::Null) => None,
                Some(v) => match serde_json::from_value(v) {
                    Ok(cfg) => Some(cfg),
                    Err(e) => return Reply::BadParams(e.to_string()),
                },
            };
            match store.set(new) {
                Ok(message) => to_value(SetConfigResult { message }),
                Err(e) => Reply::Failed(e),
            }
        }

        RpcMethod::CheckConfig => {
            let proposed: KdumpConfig = match params(raw) {
                Ok(p) => p,
                Err(e) => return Reply::BadParams(e),
            };
            match store.check(&proposed) {
                Ok(()) => Reply::Ok(Value::Null),
                Err(e) => Reply::Failed(e),
            }
        }

        RpcMethod::DeleteCrashDumps => {
            let p: IndexParams = match params(raw) {
                Ok(p) => p,
                Err(e) => return Reply::BadParams(e),
            };
            match store.engine().inventory().delete(&p.index) {
                Ok(removed) => to_value(removed),
                Err(e) => Reply::Failed(e),
            }
        }

        RpcMethod::GetCrashDmesg => {
            let p: IndexParams = match params(raw) {
                Ok(p) => p,
                Err(e) => return Reply::BadParams(e),
            };
            to_value(store.engine().inventory().dmesg_by_index(&p.index))
        }
    }
}
