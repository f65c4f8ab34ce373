//! Ingress client
//!
//! `POST {ingress}/orders` submits a payload; `DELETE {ingress}/orders`
//! cancels an order by id. Anything but HTTP 200 is a rejection carrying the
//! status code. Nothing is retried here.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tessera_order::OrderId;
use thiserror::Error;
use tracing::{debug, info};

use crate::submission::SubmissionPayload;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("ingress rejected submission with status {0}")]
    SubmissionRejected(u16),

    #[error("ingress rejected cancellation with status {0}")]
    CancellationRejected(u16),

    #[error("ingress transport: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Order submission endpoint
pub trait OrderIngress: Send + Sync {
    fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> impl Future<Output = Result<(), IngressError>> + Send;

    fn cancel(
        &self,
        order_id: &OrderId,
        signature: &str,
    ) -> impl Future<Output = Result<(), IngressError>> + Send;
}

/// HTTP ingress
pub struct IngressClient {
    base_url: String,
    client: reqwest::Client,
}

impl IngressClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IngressError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }
}

impl OrderIngress for IngressClient {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), IngressError> {
        debug!(
            url = %self.orders_url(),
            fragments = payload.fragment_count(),
            "submitting order fragments"
        );
        let response = self
            .client
            .post(self.orders_url())
            .json(payload)
            .send()
            .await?;

        check_status(response.status(), IngressError::SubmissionRejected)?;
        info!("ingress accepted order submission");
        Ok(())
    }

    async fn cancel(&self, order_id: &OrderId, signature: &str) -> Result<(), IngressError> {
        let id = order_id.to_base64();
        let response = self
            .client
            .delete(self.orders_url())
            .query(&[("id", id.as_str()), ("signature", signature)])
            .send()
            .await?;

        check_status(response.status(), IngressError::CancellationRejected)?;
        info!(order = %order_id, "ingress accepted cancellation");
        Ok(())
    }
}

/// Only 200 counts as success
fn check_status(status: StatusCode, rejected: fn(u16) -> IngressError) -> Result<(), IngressError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(rejected(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ok_is_accepted() {
        assert!(check_status(StatusCode::OK, IngressError::SubmissionRejected).is_ok());

        for status in [
            StatusCode::CREATED,
            StatusCode::NO_CONTENT,
            StatusCode::BAD_REQUEST,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            assert!(matches!(
                check_status(status, IngressError::SubmissionRejected),
                Err(IngressError::SubmissionRejected(code)) if code == status.as_u16()
            ));
        }

        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, IngressError::CancellationRejected),
            Err(IngressError::CancellationRejected(404))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = IngressClient::new("http://127.0.0.1:18516/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:18516");
        assert_eq!(client.orders_url(), "http://127.0.0.1:18516/orders");
    }
}
