// 💬 Financial Insights - contract with the external text generator
//
// The store never calls the generator. Presentation code builds a request
// from query output and calls `financial_insights`, which always returns
// something displayable.

use crate::error::InsightError;
use crate::model::{AppState, Enterprise, Transaction};
use crate::query;
use serde::{Deserialize, Serialize};

/// Shown whenever there is nothing (or nothing usable) to summarize
pub const NO_DATA_MESSAGE: &str = "There is no transaction data to analyze.";

/// Request body sent to the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    /// Currency symbol to prefix amounts with (e.g. USD)
    pub currency: String,
    pub transactions: Vec<Transaction>,
}

impl InsightRequest {
    /// Request covering one enterprise, in the farm's configured currency
    pub fn for_enterprise(state: &AppState, enterprise: Enterprise) -> Self {
        InsightRequest {
            currency: state.settings.currency.clone(),
            transactions: query::records_for(state, enterprise),
        }
    }
}

/// The external text-generation collaborator
pub trait InsightGenerator {
    fn generate(&self, request: &InsightRequest) -> Result<String, InsightError>;
}

/// Short natural-language summary, or [`NO_DATA_MESSAGE`] when there is no
/// data or the generator fails.
pub fn financial_insights<G: InsightGenerator + ?Sized>(generator: &G, request: &InsightRequest) -> String {
    if request.transactions.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let reply = generator.generate(request).and_then(|text| {
        if text.trim().is_empty() {
            Err(InsightError::EmptyResponse)
        } else {
            Ok(text)
        }
    });

    match reply {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "insight generation failed");
            NO_DATA_MESSAGE.to_string()
        }
    }
}
