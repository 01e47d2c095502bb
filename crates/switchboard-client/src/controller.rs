//! Controller-side convenience operations.
//!
//! Typed wrappers over the raw send/request surface for driving an
//! automation target: pointer movement, element queries, script execution.
//! Pointer operations are fire-and-forget; queries and script execution are
//! correlated requests.

use std::time::Duration;

use serde_json::Value;

use switchboard_protocol::{
    ElementInfo, ElementQuery, MouseButton, PointerClick, PointerHover, PointerMove, ScriptExecute,
    ScriptResult,
};

use crate::client::RelayClient;
use crate::error::ClientError;

/// How often `wait_for_element` re-queries the surface.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline for `wait_for_element`.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(10_000);

impl RelayClient {
    /// Move the pointer to viewport coordinates.
    pub async fn move_pointer(
        &self,
        x: f64,
        y: f64,
        duration: Option<u64>,
    ) -> Result<(), ClientError> {
        let payload = PointerMove { x, y, duration };
        self.send("pointer:move", serde_json::to_value(payload)?)
            .await
    }

    /// Click at viewport coordinates.
    pub async fn click_pointer(
        &self,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
    ) -> Result<(), ClientError> {
        let payload = PointerClick { x, y, button };
        self.send("pointer:click", serde_json::to_value(payload)?)
            .await
    }

    /// Hover over an element or position.
    pub async fn hover(&self, target: PointerHover) -> Result<(), ClientError> {
        self.send("pointer:hover", serde_json::to_value(target)?)
            .await
    }

    /// Query element information from the target.
    pub async fn query_element(&self, query: ElementQuery) -> Result<ElementInfo, ClientError> {
        let reply = self
            .request("element:query", serde_json::to_value(query)?)
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Query element information by CSS selector.
    pub async fn query_selector(&self, selector: &str) -> Result<ElementInfo, ClientError> {
        self.query_element(ElementQuery::selector(selector)).await
    }

    /// Query element information by element id.
    pub async fn element_by_id(&self, id: &str) -> Result<ElementInfo, ClientError> {
        self.query_element(ElementQuery::by_id(id)).await
    }

    /// Execute a script on the target surface.
    pub async fn execute_script(&self, code: &str) -> Result<ScriptResult, ClientError> {
        let payload = ScriptExecute {
            code: code.to_string(),
        };
        let reply = self
            .request("js:execute", serde_json::to_value(payload)?)
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Poll until `selector` is found on the surface or `timeout` elapses.
    pub async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementInfo, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let info = self.query_selector(selector).await?;
            if info.found {
                return Ok(info);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::ElementNotFound(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Click the center of the element matching `selector`.
    pub async fn click_element(&self, selector: &str) -> Result<(), ClientError> {
        let info = self.query_selector(selector).await?;
        let bounding_box = match (info.found, info.bounding_box) {
            (true, Some(bb)) => bb,
            _ => return Err(ClientError::ElementNotFound(selector.to_string())),
        };
        let (x, y) = bounding_box.center();
        self.click_pointer(x, y, None).await
    }

    /// The current page title of the target surface.
    pub async fn page_title(&self) -> Result<String, ClientError> {
        let result = self.execute_script("return document.title;").await?;
        if !result.success {
            return Err(ClientError::Script(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        match result.result {
            Some(Value::String(title)) => Ok(title),
            other => Ok(other
                .map(|v| v.to_string())
                .unwrap_or_default()),
        }
    }
}
