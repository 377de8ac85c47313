//! Order Router
//!
//! Places, cancels and replaces orders over the request/reply channel. Each
//! call runs inside [`DispatchGate::with_exclusive_call`], so execution
//! reports produced by the order reach the host only after this call has
//! returned the gateway's reply.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::dispatch::DispatchGate;
use super::session::SessionController;
use crate::domain::order::{CancelTicket, OrderTicket, ReplaceTicket};
use crate::error::BridgeError;
use crate::infrastructure::gateway::{
    CancelOrderRequest, CancelReplaceRequest, GatewayResponse, NewOrderRequest,
};

/// Gateway acceptance of an order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitAck {
    /// Client order id the request was sent under.
    pub client_order_id: String,
    /// Gateway text.
    pub text: Option<String>,
    /// Gateway send time.
    pub sending_time: Option<String>,
}

/// Issues signed order requests.
#[derive(Debug)]
pub struct OrderRouter {
    session: Arc<SessionController>,
    gate: Arc<DispatchGate>,
    client_id: String,
    account: String,
}

impl OrderRouter {
    /// Create a router for one gateway client id and account.
    #[must_use]
    pub fn new(
        session: Arc<SessionController>,
        gate: Arc<DispatchGate>,
        client_id: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            session,
            gate,
            client_id: client_id.into(),
            account: account.into(),
        }
    }

    /// Submit a new order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Rejected`] on a non-zero status, or the
    /// session/transport error of the exchange.
    pub async fn place_order(&self, ticket: &OrderTicket) -> Result<SubmitAck, BridgeError> {
        let request = NewOrderRequest::from_ticket(
            ticket,
            &self.client_id,
            &self.account,
            new_client_order_id(),
            Utc::now(),
        );
        tracing::info!(
            cl_ord_id = %request.cl_ord_id,
            symbol = %ticket.symbol,
            side = ?ticket.side,
            kind = ?ticket.kind,
            quantity = %ticket.quantity,
            "Placing order"
        );
        let cl_ord_id = request.cl_ord_id.clone();
        self.submit("new_order", cl_ord_id, &request).await
    }

    /// Cancel an open order.
    ///
    /// # Errors
    ///
    /// As [`place_order`](Self::place_order).
    pub async fn cancel_order(&self, ticket: &CancelTicket) -> Result<SubmitAck, BridgeError> {
        let request =
            CancelOrderRequest::from_ticket(ticket, &self.client_id, new_client_order_id(), Utc::now());
        tracing::info!(
            cl_ord_id = %request.cl_ord_id,
            orig_cl_ord_id = %ticket.orig_client_order_id,
            "Cancelling order"
        );
        let cl_ord_id = request.cl_ord_id.clone();
        self.submit("cancel", cl_ord_id, &request).await
    }

    /// Replace an open order.
    ///
    /// # Errors
    ///
    /// As [`place_order`](Self::place_order).
    pub async fn replace_order(&self, ticket: &ReplaceTicket) -> Result<SubmitAck, BridgeError> {
        let request = CancelReplaceRequest::from_ticket(
            ticket,
            &self.client_id,
            new_client_order_id(),
            Utc::now(),
        );
        tracing::info!(
            cl_ord_id = %request.cl_ord_id,
            orig_cl_ord_id = %ticket.orig_client_order_id,
            quantity = %ticket.quantity,
            "Replacing order"
        );
        let cl_ord_id = request.cl_ord_id.clone();
        self.submit("cancel_replace", cl_ord_id, &request).await
    }

    async fn submit<T: Serialize + Sync>(
        &self,
        operation: &'static str,
        cl_ord_id: String,
        request: &T,
    ) -> Result<SubmitAck, BridgeError> {
        let response: GatewayResponse = self
            .gate
            .with_exclusive_call(|| self.session.send_signed(request))
            .await
            .inspect_err(|e| {
                tracing::warn!(operation, cl_ord_id = %cl_ord_id, error = %e, "Order request failed");
            })?;

        if !response.is_success() {
            let text = response.text().unwrap_or_default().to_string();
            tracing::warn!(
                operation,
                cl_ord_id = %cl_ord_id,
                status = response.status,
                text = %text,
                "Gateway rejected order request"
            );
            return Err(BridgeError::Rejected {
                status: response.status,
                text,
            });
        }

        Ok(SubmitAck {
            client_order_id: response.cl_ord_id.clone().unwrap_or(cl_ord_id),
            text: response.text().map(str::to_string),
            sending_time: response.sending_time,
        })
    }
}

/// 32 lowercase hex characters.
fn new_client_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}
