//! ==============================================================================
//! controller.rs - clients for the two remote endpoints
//! ==============================================================================
//!
//! purpose:
//!     the only place that speaks HTTP to the rig. the core talks to the
//!     traits below; the reqwest-backed types are what main.rs plugs in,
//!     tests plug in in-memory fakes.
//!
//! endpoints:
//!     - GET {base}/status              any 2xx => reachable
//!     - GET {base}/data                { "sensors": {..}, "thresholds": {..} }
//!     - GET {base}/set?temp=..&moist=..  2xx => write accepted
//!     - GET {stream_url}               multipart jpeg stream (camera)
//!
//! ==============================================================================

use std::future::Future;

use anyhow::{Context, Result};
use reqwest::{Client, Response};

use crate::config::{CameraConfig, ControllerConfig};
use crate::domain::DataResponse;

/// the rig's sensor/actuator API
pub trait ControllerApi: Send + Sync + 'static {
    /// succeeds on any 2xx from the status endpoint
    fn status(&self) -> impl Future<Output = Result<()>> + Send;

    /// latest reading plus the controller's current limits
    fn data(&self) -> impl Future<Output = Result<DataResponse>> + Send;

    /// write new limits; the controller may clamp them
    fn set_thresholds(&self, temp: f64, moist: f64) -> impl Future<Output = Result<()>> + Send;
}

/// the camera has no health endpoint: loading one frame is the check
pub trait CameraFeed: Send + Sync + 'static {
    /// resolves once the stream has started delivering a frame
    fn first_frame(&self) -> impl Future<Output = Result<()>> + Send;
}

// ==============================================================================
// reqwest implementations
// ==============================================================================

#[derive(Clone)]
pub struct HttpController {
    client: Client,
    base_url: String,
}

impl HttpController {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build controller http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_ok(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET /{} failed", path))?
            .error_for_status()
            .with_context(|| format!("GET /{} rejected", path))?;
        Ok(response)
    }
}

impl ControllerApi for HttpController {
    fn status(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.get_ok("status", &[]).await?;
            Ok(())
        }
    }

    fn data(&self) -> impl Future<Output = Result<DataResponse>> + Send {
        async move {
            let response = self.get_ok("data", &[]).await?;
            response
                .json::<DataResponse>()
                .await
                .context("malformed /data body")
        }
    }

    fn set_thresholds(&self, temp: f64, moist: f64) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.get_ok("set", &[("temp", temp.to_string()), ("moist", moist.to_string())])
                .await?;
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct HttpCamera {
    client: Client,
    stream_url: String,
}

impl HttpCamera {
    /// no request timeout here: the stream never ends and the prober owns the deadline
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build camera http client")?;
        Ok(Self {
            client,
            stream_url: config.stream_url.clone(),
        })
    }
}

impl CameraFeed for HttpCamera {
    fn first_frame(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut response = self
                .client
                .get(&self.stream_url)
                .send()
                .await
                .context("camera stream request failed")?
                .error_for_status()
                .context("camera stream rejected")?;

            // the first body chunk means frames are flowing; dropping the
            // response closes the stream
            match response.chunk().await.context("camera stream broke")? {
                Some(_) => Ok(()),
                None => anyhow::bail!("camera stream ended before a frame arrived"),
            }
        }
    }
}
