//! Package catalog and order totals for the counselor pricing page.

use axum::{Json, extract::Query};
use serde::{Deserialize, Serialize};

use dash_memories_core::{AddOn, Price, Tier, calculate_total};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceView {
    /// Whole cents, as Stripe expects.
    pub cents: Option<i64>,
    /// e.g. `$1,250.00`.
    pub display: String,
}

impl From<Price> for PriceView {
    fn from(price: Price) -> Self {
        Self {
            cents: price.cents(),
            display: price.display(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogItem {
    pub id: &'static str,
    pub name: &'static str,
    pub price: PriceView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResponse {
    pub tiers: Vec<CatalogItem>,
    pub add_ons: Vec<CatalogItem>,
    /// Present when `tier` was given.
    pub total: Option<PriceView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingQuery {
    pub tier: Option<String>,
    /// Comma-separated add-on ids.
    pub add_ons: Option<String>,
}

impl PricingQuery {
    fn add_on_ids(&self) -> Vec<&str> {
        self.add_ons
            .as_deref()
            .map(|ids| ids.split(',').map(str::trim).filter(|id| !id.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Build the catalog, with a total when a tier is selected.
///
/// Unknown tiers total zero and unknown add-ons add nothing.
#[must_use]
pub fn quote(query: &PricingQuery) -> PricingResponse {
    PricingResponse {
        tiers: Tier::ALL
            .into_iter()
            .map(|t| CatalogItem {
                id: t.id(),
                name: t.name(),
                price: t.price().into(),
            })
            .collect(),
        add_ons: AddOn::ALL
            .into_iter()
            .map(|a| CatalogItem {
                id: a.id(),
                name: a.name(),
                price: a.price().into(),
            })
            .collect(),
        total: query
            .tier
            .as_deref()
            .map(|tier| calculate_total(tier.trim(), &query.add_on_ids()).into()),
    }
}

/// GET /api/pricing?tier=&addOns=
pub async fn show(Query(query): Query<PricingQuery>) -> Json<PricingResponse> {
    Json(quote(&query))
}
