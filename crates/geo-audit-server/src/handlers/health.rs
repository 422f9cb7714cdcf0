use super::Ctx;
use crate::response::ApiResponse;
use geo_audit_core::envelope::Envelope;
use serde_json::json;

pub async fn health(ctx: Ctx) -> ApiResponse {
    ApiResponse(Envelope::ok(json!({
        "service": "geo-audit-server",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": {
            "dataforseo": ctx.serp.is_some(),
            "search_console": ctx.search_console.is_some(),
            "business_profile": ctx.business_profile.is_some(),
        },
        "store": ctx.store().backend_name(),
    })))
}
