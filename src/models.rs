use serde::{Deserialize, Serialize};

use crate::executor::ExecutionPath;

// Demo figure, not a measured emission factor
pub const CO2_GRAMS_PER_MB: f64 = 0.5;

#[derive(Deserialize)]
pub struct UsageQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub is_pro: bool,
    pub remaining: Option<u32>, // null means unlimited
    pub daily_limit: u32,
}

#[derive(Deserialize, Default)]
pub struct CreateOrderRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub key: String,
    pub amount: u64,
    pub currency: String,
    pub order_id: String,
}

// Accepts our field names and the checkout callback's razorpay_* names
#[derive(Deserialize, Default)]
pub struct VerifyPaymentRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "orderId", alias = "razorpay_order_id")]
    pub order_id: Option<String>,
    #[serde(rename = "paymentId", alias = "razorpay_payment_id")]
    pub payment_id: Option<String>,
    #[serde(alias = "razorpay_signature")]
    pub signature: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub is_pro: bool,
}

/// Size metrics for one finished compression, reported as response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub original_size: usize,
    pub compressed_size: usize,
    pub path: ExecutionPath,
}

impl CompressionOutcome {
    pub fn saved_bytes(&self) -> usize {
        self.original_size.saturating_sub(self.compressed_size)
    }

    /// Whole-percent reduction; `None` for an empty upload.
    pub fn reduction_percent(&self) -> Option<i64> {
        if self.original_size == 0 {
            return None;
        }
        let original = self.original_size as f64;
        let delta = original - self.compressed_size as f64;
        Some((delta / original * 100.0).round() as i64)
    }

    /// Illustrative CO2 saving in grams, rounded to two decimals.
    pub fn co2_saved_grams(&self) -> Option<f64> {
        if self.original_size == 0 {
            return None;
        }
        let saved_mb = self.saved_bytes() as f64 / (1024.0 * 1024.0);
        Some((saved_mb * CO2_GRAMS_PER_MB * 100.0).round() / 100.0)
    }
}
