use std::collections::HashMap;

use anyhow::Context;
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    attrs::{self, Attr, AttrKind},
    state::AppState,
};

use super::{
    dto::{RecipeDetail, RecipeInput, RecipeSummary},
    images::{recipe_image_key, CheckedImage},
    repo::{self, NewRecipe, Recipe, RecipeChanges},
};

/// Resolves each name to the user's row (creating missing ones) and makes
/// the resolved set the recipe's complete set.
async fn replace_attrs(
    conn: &mut PgConnection,
    kind: AttrKind,
    user_id: Uuid,
    recipe_id: i64,
    names: &[String],
) -> anyhow::Result<()> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let row = attrs::repo::get_or_create(&mut *conn, kind, user_id, name).await?;
        if !ids.contains(&row.id) {
            ids.push(row.id);
        }
    }
    attrs::repo::replace_links(&mut *conn, kind, recipe_id, &ids).await
}

async fn apply_attrs(
    conn: &mut PgConnection,
    user_id: Uuid,
    recipe_id: i64,
    input: &RecipeInput,
) -> anyhow::Result<()> {
    if let Some(tags) = &input.tags {
        replace_attrs(&mut *conn, AttrKind::Tag, user_id, recipe_id, tags).await?;
    }
    if let Some(ingredients) = &input.ingredients {
        replace_attrs(&mut *conn, AttrKind::Ingredient, user_id, recipe_id, ingredients).await?;
    }
    Ok(())
}

/// `input` must come from a non-partial validation.
pub async fn create_recipe(st: &AppState, user_id: Uuid, input: RecipeInput) -> anyhow::Result<Recipe> {
    let new = NewRecipe {
        title: input.title.clone().context("title missing")?,
        time_minutes: input.time_minutes.context("time_minutes missing")?,
        price: input.price.context("price missing")?,
        description: input.description.clone().unwrap_or_default(),
        link: input.link.clone().unwrap_or_default(),
    };

    let mut tx = st.db.begin().await.context("begin tx")?;
    let recipe = repo::insert(&mut tx, user_id, &new).await?;
    apply_attrs(&mut tx, user_id, recipe.id, &input).await?;
    tx.commit().await.context("commit tx")?;

    info!(%user_id, recipe_id = recipe.id, "recipe created");
    Ok(recipe)
}

/// `None` when the recipe is not the user's.
pub async fn update_recipe(
    st: &AppState,
    user_id: Uuid,
    id: i64,
    input: RecipeInput,
) -> anyhow::Result<Option<Recipe>> {
    let changes = RecipeChanges {
        title: input.title.clone(),
        time_minutes: input.time_minutes,
        price: input.price,
        description: input.description.clone(),
        link: input.link.clone(),
    };

    let mut tx = st.db.begin().await.context("begin tx")?;
    let Some(recipe) = repo::update(&mut tx, user_id, id, &changes).await? else {
        return Ok(None);
    };
    apply_attrs(&mut tx, user_id, recipe.id, &input).await?;
    tx.commit().await.context("commit tx")?;

    info!(%user_id, recipe_id = recipe.id, "recipe updated");
    Ok(Some(recipe))
}

/// Returns false when the recipe is not the user's. The stored image is
/// removed best-effort.
pub async fn delete_recipe(st: &AppState, user_id: Uuid, id: i64) -> anyhow::Result<bool> {
    let Some(image) = repo::delete(&st.db, user_id, id).await? else {
        return Ok(false);
    };
    if let Some(key) = image {
        if let Err(e) = st.storage.delete_object(&key).await {
            warn!(error = %e, key, "failed to delete recipe image");
        }
    }
    info!(%user_id, recipe_id = id, "recipe deleted");
    Ok(true)
}

/// Stores the image and points the recipe at it. `None` when the recipe is
/// not the user's; the uploaded object is removed again in that case.
pub async fn attach_image(
    st: &AppState,
    user_id: Uuid,
    id: i64,
    image: CheckedImage,
) -> anyhow::Result<Option<String>> {
    let key = recipe_image_key(image.extension());
    st.storage
        .put_object(&key, image.body.clone(), image.content_type())
        .await
        .with_context(|| format!("put_object {key}"))?;

    let previous = match repo::set_image(&st.db, user_id, id, &key).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard(st, &key).await;
            return Ok(None);
        }
        Err(e) => {
            discard(st, &key).await;
            return Err(e);
        }
    };
    if let Some(old) = previous {
        discard(st, &old).await;
    }

    info!(%user_id, recipe_id = id, key, "recipe image stored");
    Ok(Some(st.storage.object_url(&key).await?))
}

async fn discard(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key, "failed to delete image object");
    }
}

async fn attrs_for(
    st: &AppState,
    recipe_ids: &[i64],
) -> anyhow::Result<(HashMap<i64, Vec<Attr>>, HashMap<i64, Vec<Attr>>)> {
    let tags = attrs::repo::for_recipes(&st.db, AttrKind::Tag, recipe_ids).await?;
    let ingredients = attrs::repo::for_recipes(&st.db, AttrKind::Ingredient, recipe_ids).await?;
    Ok((tags, ingredients))
}

pub async fn summaries(st: &AppState, recipes: &[Recipe]) -> anyhow::Result<Vec<RecipeSummary>> {
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let (mut tags, mut ingredients) = attrs_for(st, &ids).await?;
    Ok(recipes
        .iter()
        .map(|r| {
            RecipeSummary::new(
                r,
                tags.remove(&r.id).unwrap_or_default(),
                ingredients.remove(&r.id).unwrap_or_default(),
            )
        })
        .collect())
}

pub async fn detail(st: &AppState, recipe: Recipe) -> anyhow::Result<RecipeDetail> {
    let summary = summaries(st, std::slice::from_ref(&recipe))
        .await?
        .pop()
        .context("summary for recipe")?;
    let image = match recipe.image.as_deref() {
        Some(key) => Some(st.storage.object_url(key).await?),
        None => None,
    };
    Ok(RecipeDetail {
        summary,
        description: recipe.description,
        image,
    })
}
