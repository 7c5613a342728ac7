//! Unix socket client for communicating with kdumpd.

use anyhow::{anyhow, Context, Result};
use kdump_common::rpc::{IndexParams, RpcMethod, RpcRequest, RpcResponse, SetConfigResult};
use kdump_common::{CrashDmesg, KdumpConfig, KdumpStatus, SOCKET_PATH};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Socket path: explicit flag, then `$KDUMPD_SOCKET`, then the default
pub fn discover_socket_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("KDUMPD_SOCKET") {
        return PathBuf::from(path);
    }
    PathBuf::from(SOCKET_PATH)
}

/// Client for communicating with kdumpd
pub struct KdumpdClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl KdumpdClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        if !socket_path.exists() {
            return Err(anyhow!(
                "kdumpd not running: {} does not exist\n\
                 Try: sudo systemctl status kdumpd",
                socket_path.display()
            ));
        }

        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            anyhow!(
                "Cannot connect to kdumpd at {}: {}\n\
                 Try: sudo systemctl restart kdumpd",
                socket_path.display(),
                e
            )
        })?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send an RPC request and get the response
    pub async fn call(
        &mut self,
        method: RpcMethod,
        params: Option<serde_json::Value>,
    ) -> Result<RpcResponse> {
        let request = RpcRequest::new(method, params);
        let request_json = serde_json::to_string(&request)? + "\n";
        self.writer
            .write_all(request_json.as_bytes())
            .await
            .context("Failed to send request")?;

        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .context("Failed to read response")?;
        if n == 0 {
            return Err(anyhow!("kdumpd closed the connection"));
        }

        let response: RpcResponse =
            serde_json::from_str(&line).context("Failed to parse response")?;
        if response.id != request.id {
            anyhow::bail!("Response ID mismatch");
        }
        Ok(response)
    }

    async fn call_for<T: DeserializeOwned>(
        &mut self,
        method: RpcMethod,
        params: Option<serde_json::Value>,
    ) -> Result<T> {
        let response = self.call(method, params).await?;
        if let Some(error) = response.error {
            return Err(anyhow!("{}", error.message));
        }
        let result = response.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    pub async fn status(&mut self) -> Result<KdumpStatus> {
        self.call_for(RpcMethod::Status, None).await
    }

    pub async fn config(&mut self) -> Result<KdumpConfig> {
        self.call_for(RpcMethod::GetConfig, None).await
    }

    pub async fn set_config(&mut self, config: &KdumpConfig) -> Result<String> {
        let params = serde_json::to_value(config)?;
        let result: SetConfigResult = self.call_for(RpcMethod::SetConfig, Some(params)).await?;
        Ok(result.message)
    }

    pub async fn check_config(&mut self, config: &KdumpConfig) -> Result<()> {
        let params = serde_json::to_value(config)?;
        let _: serde_json::Value = self.call_for(RpcMethod::CheckConfig, Some(params)).await?;
        Ok(())
    }

    /// Returns how many dumps were removed
    pub async fn delete_crash_dumps(&mut self, index: Vec<i32>) -> Result<usize> {
        let params = serde_json::to_value(IndexParams { index })?;
        self.call_for(RpcMethod::DeleteCrashDumps, Some(params)).await
    }

    pub async fn crash_dmesg(&mut self, index: Vec<i32>) -> Result<Vec<CrashDmesg>> {
        let params = serde_json::to_value(IndexParams { index })?;
        self.call_for(RpcMethod::GetCrashDmesg, Some(params)).await
    }
}
