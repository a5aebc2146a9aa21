use std::sync::Arc;

use crate::config::Args;
use crate::executor::CompressionExecutor;
use crate::ledger::UsageLedger;
use crate::payment::{EntitlementVerifier, PaymentClient, ProviderCredentials};
use crate::rate_limit::RateLimiter;
use crate::tool::ToolChain;

// app's shared state
pub struct AppState {
    pub ledger: Arc<UsageLedger>,              // per-user quota + entitlement
    pub rate_limiter: Arc<RateLimiter>,        // per-origin throttling
    pub executor: CompressionExecutor,         // tool -> fallback -> passthrough
    pub verifier: EntitlementVerifier,         // only writer of entitlement
    pub payments: PaymentClient,               // provider order creation
}

impl AppState {
    pub fn from_args(args: &Args, client: reqwest::Client) -> Self {
        let ledger = Arc::new(UsageLedger::in_memory(args.daily_limit));
        let credentials = ProviderCredentials::from_parts(
            args.razorpay_key_id.clone(),
            args.razorpay_key_secret.clone(),
        );

        Self {
            rate_limiter: Arc::new(RateLimiter::new(args.rate_limit, args.rate_window())),
            executor: CompressionExecutor::new(
                ToolChain::new(&args.tool_candidates(), args.tool_timeout()),
                args.temp_dir(),
            ),
            verifier: EntitlementVerifier::new(args.razorpay_key_secret.clone(), Arc::clone(&ledger)),
            payments: PaymentClient::new(
                client,
                credentials,
                &args.razorpay_api_base,
                args.pro_price,
                &args.currency,
            ),
            ledger,
        }
    }
}
