use serde::Deserialize;

use crate::{
    error::{ApiError, FieldErrors},
    validation::{int_flag, optional_text, required_text},
};

pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub assigned_only: Option<String>,
}

impl ListParams {
    pub fn assigned_only(&self) -> Result<bool, ApiError> {
        int_flag("assigned_only", self.assigned_only.as_deref())
    }
}

/// Body of `PUT`/`PATCH` on a tag or ingredient.
#[derive(Debug, Default, Deserialize)]
pub struct AttrRequest {
    pub name: Option<String>,
}

impl AttrRequest {
    /// `None` means a PATCH that changes nothing.
    pub fn into_name(self, partial: bool) -> Result<Option<String>, ApiError> {
        let mut errors = FieldErrors::new();
        let name = if partial {
            optional_text(&mut errors, "name", self.name.as_deref(), MAX_NAME_LEN)
        } else {
            required_text(&mut errors, "name", self.name.as_deref(), MAX_NAME_LEN)
        };
        errors.into_result()?;
        Ok(name)
    }
}
