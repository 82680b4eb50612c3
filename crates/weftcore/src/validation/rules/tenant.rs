//! Rule: Tenant
//!
//! In multi-tenant mode every document must name its tenant. Storage
//! handlers read the tenant from the run context, so a document without one
//! cannot be isolated.

use crate::validation::{Document, Issue, ValidationRule};
use serde_json::Value as Json;

pub struct TenantRule;

impl ValidationRule for TenantRule {
    fn id(&self) -> &'static str {
        "tenant"
    }

    fn description(&self) -> &'static str {
        "Documents carry a tenantId in multi-tenant mode"
    }

    fn check(&self, document: &Document<'_>) -> Vec<Issue> {
        match document.root.get("tenantId") {
            Some(Json::String(tenant)) if !tenant.trim().is_empty() => Vec::new(),
            None | Some(Json::Null) | Some(Json::String(_)) => {
                if document.options.tenant_mode {
                    vec![Issue::warning(
                        "tenantId",
                        "missing tenantId in multi-tenant mode",
                        self.id(),
                    )]
                } else {
                    Vec::new()
                }
            }
            Some(_) => vec![Issue::error("tenantId", "must be a string", self.id())],
        }
    }
}
