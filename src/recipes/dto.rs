use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    attrs::Attr,
    error::{ApiError, FieldErrors},
    validation::{max_length_ok, optional_text, required_text, REQUIRED},
};

use super::repo::Recipe;

const MAX_LEN: usize = 255;
pub const PRICE_MAX_DIGITS: u32 = 5;
pub const PRICE_DECIMAL_PLACES: u32 = 2;

/// `{"name": ...}` entry in a recipe's `tags` / `ingredients` list.
#[derive(Debug, Default, Deserialize)]
pub struct NameRef {
    pub name: Option<String>,
}

/// Body of `POST`, `PUT` and `PATCH` on recipes. Numbers arrive as JSON
/// numbers or strings, so they are validated by hand to keep errors per field.
/// Keys not listed here are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeRequest {
    pub title: Option<String>,
    pub time_minutes: Option<Value>,
    pub price: Option<Value>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub tags: Option<Vec<NameRef>>,
    pub ingredients: Option<Vec<NameRef>>,
}

/// Validated recipe fields; `None` means "not supplied".
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipeInput {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipeRequest {
    /// `partial` is true for PATCH. For POST and PUT `title`, `time_minutes`
    /// and `price` are required.
    pub fn validate(self, partial: bool) -> Result<RecipeInput, ApiError> {
        let mut errors = FieldErrors::new();

        let title = if partial {
            optional_text(&mut errors, "title", self.title.as_deref(), MAX_LEN)
        } else {
            required_text(&mut errors, "title", self.title.as_deref(), MAX_LEN)
        };

        let time_minutes = match self.time_minutes {
            None | Some(Value::Null) => {
                if !partial {
                    errors.add("time_minutes", REQUIRED);
                }
                None
            }
            Some(v) => parse_minutes(&mut errors, &v),
        };

        let price = match self.price {
            None | Some(Value::Null) => {
                if !partial {
                    errors.add("price", REQUIRED);
                }
                None
            }
            Some(v) => parse_price(&mut errors, &v),
        };

        let description = self.description.map(|d| d.trim().to_string());
        let link = self
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| max_length_ok(&mut errors, "link", l, MAX_LEN));

        let tags = self.tags.map(|t| names(&mut errors, "tags", t));
        let ingredients = self.ingredients.map(|i| names(&mut errors, "ingredients", i));

        errors.into_result()?;
        Ok(RecipeInput {
            title,
            time_minutes,
            price,
            description,
            link,
            tags,
            ingredients,
        })
    }
}

fn parse_minutes(errors: &mut FieldErrors, value: &Value) -> Option<i32> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let minutes = parsed.and_then(|n| i32::try_from(n).ok());
    if minutes.is_none() {
        errors.add("time_minutes", "A valid integer is required.");
    }
    minutes
}

/// Decimal with at most 5 digits, 2 of them after the point, stored at scale 2.
pub fn parse_price(errors: &mut FieldErrors, value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    };
    let Ok(mut price) = Decimal::from_str(&raw) else {
        errors.add("price", "A valid number is required.");
        return None;
    };
    price = price.normalize();
    if price.scale() > PRICE_DECIMAL_PLACES {
        errors.add(
            "price",
            format!("Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."),
        );
        return None;
    }
    let max_whole = Decimal::from(10i64.pow(PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES));
    if price.abs().trunc() >= max_whole {
        errors.add(
            "price",
            format!(
                "Ensure that there are no more than {} digits before the decimal point.",
                PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES
            ),
        );
        return None;
    }
    price.rescale(PRICE_DECIMAL_PLACES);
    Some(price)
}

/// Trimmed names in first-seen order, duplicates dropped.
fn names(errors: &mut FieldErrors, field: &str, refs: Vec<NameRef>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(refs.len());
    for r in refs {
        let Some(name) = required_text(errors, field, r.name.as_deref(), MAX_LEN) else {
            continue;
        };
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Recipe filters on the list endpoint: comma-separated ids.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeFilterParams {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tag_ids: Option<Vec<i64>>,
    pub ingredient_ids: Option<Vec<i64>>,
}

impl RecipeFilterParams {
    pub fn parse(self) -> Result<RecipeFilter, ApiError> {
        let mut errors = FieldErrors::new();
        let tag_ids = self.tags.and_then(|s| id_list(&mut errors, "tags", &s));
        let ingredient_ids = self
            .ingredients
            .and_then(|s| id_list(&mut errors, "ingredients", &s));
        errors.into_result()?;
        Ok(RecipeFilter {
            tag_ids,
            ingredient_ids,
        })
    }
}

fn id_list(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<Vec<i64>> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    match parts.iter().map(|p| p.parse::<i64>()).collect() {
        Ok(ids) => Some(ids),
        Err(_) => {
            errors.add(field, "Enter a comma-separated list of ids.");
            None
        }
    }
}

/// Shape returned by the list endpoint.
#[derive(Debug, Serialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<Attr>,
    pub ingredients: Vec<Attr>,
}

/// Shape returned by retrieve, create and update.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub summary: RecipeSummary,
    pub description: String,
    pub image: Option<String>,
}

impl RecipeSummary {
    pub fn new(recipe: &Recipe, tags: Vec<Attr>, ingredients: Vec<Attr>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title.clone(),
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link.clone(),
            tags,
            ingredients,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: String,
}
