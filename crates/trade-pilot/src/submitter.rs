//! Order submission state machine.
//!
//! A plan is single-shot: one call to `submit` drives it to a terminal
//! state (filled or rejected) and the plan is never resubmitted. Fill-mode
//! rejections walk the fallback chain; null/timeout responses get a
//! bounded retry with a 1 s backoff.

use std::time::Duration;

use broker_gateway::{BrokerGateway, OrderRequest, OrderStatus};
use market_core::{FillMode, PipelineResult};
use tracing::{error, info, warn};

use crate::types::EntryPlan;

const FILL_MODE_CHAIN: [FillMode; 3] = [FillMode::Fok, FillMode::Ioc, FillMode::Return];
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Terminal outcome of one plan submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Filled {
        ticket: u64,
        price: f64,
        fill_mode: FillMode,
    },
    Rejected {
        retcode: Option<i32>,
        comment: String,
    },
}

pub struct OrderSubmitter {
    max_retries: u32,
}

impl OrderSubmitter {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub async fn submit(
        &self,
        gateway: &dyn BrokerGateway,
        plan: &EntryPlan,
    ) -> PipelineResult<SubmitOutcome> {
        let mut tried: Vec<FillMode> = Vec::new();
        let mut mode = plan.fill_mode;

        loop {
            tried.push(mode);
            let result = self.send_with_retry(gateway, plan, mode).await?;

            match result.status {
                OrderStatus::Filled => {
                    let ticket = result.ticket.unwrap_or_default();
                    let price = result.price.unwrap_or(plan.price);
                    if tried.len() > 1 {
                        info!(
                            "FALLBACK_SUCCESS {} {} Mode:{} Ticket:{}",
                            plan.symbol, plan.side, mode, ticket
                        );
                    }
                    info!(
                        "Order filled: {} {} {:.2} lots @ {} ticket #{}",
                        plan.symbol, plan.side, plan.volume, price, ticket
                    );
                    return Ok(SubmitOutcome::Filled {
                        ticket,
                        price,
                        fill_mode: mode,
                    });
                }
                OrderStatus::FillModeError => {
                    warn!(
                        "FILLING_MODE_ERROR {} retcode={:?} comment={:?} Mode:{}",
                        plan.symbol, result.retcode, result.comment, mode
                    );
                    match FILL_MODE_CHAIN.iter().find(|m| !tried.contains(m)) {
                        Some(next) => {
                            mode = *next;
                            continue;
                        }
                        None => {
                            error!(
                                "Order rejected: {} {}: fill-mode chain exhausted",
                                plan.symbol, plan.side
                            );
                            return Ok(SubmitOutcome::Rejected {
                                retcode: result.retcode,
                                comment: result
                                    .comment
                                    .unwrap_or_else(|| "fill-mode chain exhausted".to_string()),
                            });
                        }
                    }
                }
                OrderStatus::TransientError => {
                    error!(
                        "Order rejected: {} {}: no broker response after {} retries",
                        plan.symbol,
                        plan.side,
                        self.max_retries
                    );
                    return Ok(SubmitOutcome::Rejected {
                        retcode: result.retcode,
                        comment: result
                            .comment
                            .unwrap_or_else(|| "no broker response".to_string()),
                    });
                }
                OrderStatus::Rejected => {
                    error!(
                        "Order rejected: {} {} retcode={:?} comment={:?} Mode:{}",
                        plan.symbol, plan.side, result.retcode, result.comment, mode
                    );
                    return Ok(SubmitOutcome::Rejected {
                        retcode: result.retcode,
                        comment: result.comment.unwrap_or_default(),
                    });
                }
            }
        }
    }

    /// One fill mode, at most `max_retries + 1` sends. Only transient
    /// (null/timeout) results are retried here.
    async fn send_with_retry(
        &self,
        gateway: &dyn BrokerGateway,
        plan: &EntryPlan,
        mode: FillMode,
    ) -> PipelineResult<broker_gateway::OrderResult> {
        let request = OrderRequest {
            symbol: plan.symbol.clone(),
            side: plan.side,
            kind: plan.kind,
            volume: plan.volume,
            price: plan.price,
            sl: plan.sl,
            tp: plan.tp,
            fill_mode: mode,
            comment: format!("auto conf={:.2}", plan.confidence),
        };

        let mut attempt = 0u32;
        loop {
            info!(
                "Submitting {} {} {} {:.2} lots @ {} sl={} tp={} Mode:{} attempt {}",
                plan.symbol,
                plan.kind.as_str(),
                plan.side,
                plan.volume,
                plan.price,
                plan.sl,
                plan.tp,
                mode,
                attempt + 1
            );
            let result = gateway.order_send(&request).await?;
            if result.status == OrderStatus::TransientError && attempt < self.max_retries {
                attempt += 1;
                warn!(
                    "No broker response for {} (attempt {}), retrying in {:?}",
                    plan.symbol, attempt, RETRY_BACKOFF
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
            return Ok(result);
        }
    }
}
