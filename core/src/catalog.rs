//! FoodData Central response types and the `FoodCatalog` lookup seam.
//!
//! The HTTP client lives in the CLI; this module only knows how to turn
//! response bodies into catalog values and catalog values into foods.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ENERGY_NUTRIENT_IDS, NewFood, Nutrient, scale_per_100g};

/// External food lookup.
///
/// Implementations report transport failures as `Error::CatalogUnavailable`
/// and unparseable bodies as `Error::CatalogFormat`.
pub trait FoodCatalog: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<CatalogHit>>;
    fn details(&self, fdc_id: i64) -> Result<CatalogFood>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogHit {
    pub fdc_id: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogFood {
    pub fdc_id: i64,
    pub description: String,
    pub nutrients: Vec<Nutrient>,
}

impl CatalogFood {
    /// Energy in kcal per 100 g, when the catalog reports it.
    #[must_use]
    pub fn calories(&self) -> Option<f64> {
        ENERGY_NUTRIENT_IDS.iter().find_map(|id| {
            self.nutrients
                .iter()
                .find(|n| n.nutrient_id == *id)
                .map(|n| n.amount_per_100g)
        })
    }

    /// Nutrient amounts for `grams` of this food instead of per 100 g.
    #[must_use]
    pub fn scaled(&self, grams: f64) -> Vec<Nutrient> {
        self.nutrients
            .iter()
            .map(|n| Nutrient {
                nutrient_id: n.nutrient_id,
                amount_per_100g: scale_per_100g(n.amount_per_100g, grams),
            })
            .collect()
    }

    #[must_use]
    pub fn into_new_food(self) -> NewFood {
        let calories = self.calories();
        NewFood {
            fdc_id: Some(self.fdc_id),
            name: self.description,
            calories,
            nutrients: self.nutrients,
            source: "fdc".to_string(),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub foods: Vec<SearchFood>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFood {
    pub fdc_id: i64,
    pub description: Option<String>,
    pub data_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    pub fdc_id: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub food_nutrients: Vec<FoodNutrient>,
}

/// Nutrient row in either the full or the abridged detail format.
///
/// The full format nests the nutrient id under `nutrient`; the abridged format
/// flattens it into `nutrientId`/`value`. The full format's own row `id` is
/// not a nutrient id and is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodNutrient {
    pub nutrient_id: Option<i64>,
    pub nutrient: Option<NutrientInfo>,
    pub amount: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct NutrientInfo {
    pub id: Option<i64>,
}

impl FoodNutrient {
    fn into_nutrient(self) -> Option<Nutrient> {
        let nutrient_id = self
            .nutrient
            .and_then(|n| n.id)
            .or(self.nutrient_id)?;
        let amount = self.amount.or(self.value)?;
        Some(Nutrient {
            nutrient_id,
            amount_per_100g: amount,
        })
    }
}

#[must_use]
pub fn search_to_hits(resp: SearchResponse) -> Vec<CatalogHit> {
    resp.foods
        .into_iter()
        .map(|f| CatalogHit {
            fdc_id: f.fdc_id,
            description: f.description.unwrap_or_default(),
            data_type: f.data_type.filter(|d| !d.is_empty()),
        })
        .collect()
}

#[must_use]
pub fn details_to_food(resp: DetailsResponse) -> CatalogFood {
    CatalogFood {
        fdc_id: resp.fdc_id,
        description: resp
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("FDC food {}", resp.fdc_id)),
        nutrients: resp
            .food_nutrients
            .into_iter()
            .filter_map(FoodNutrient::into_nutrient)
            .collect(),
    }
}

pub fn parse_search_body(body: &str) -> Result<Vec<CatalogHit>> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| Error::CatalogFormat(e.to_string()))?;
    Ok(search_to_hits(resp))
}

pub fn parse_details_body(body: &str) -> Result<CatalogFood> {
    let resp: DetailsResponse =
        serde_json::from_str(body).map_err(|e| Error::CatalogFormat(e.to_string()))?;
    Ok(details_to_food(resp))
}
