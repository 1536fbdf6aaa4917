use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::dto::RecipeFilter;

const RECIPE_COLUMNS: &str =
    "id, user_id, title, time_minutes, price, description, link, image";

#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub description: String,
    pub link: String,
    pub image: Option<String>, // storage key
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub description: String,
    pub link: String,
}

/// Scalar columns to overwrite; `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// The user's recipes, newest id first, narrowed by any tag/ingredient ids.
pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    filter: &RecipeFilter,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        SELECT {RECIPE_COLUMNS}
          FROM recipes r
         WHERE r.user_id = $1
           AND ($2::bigint[] IS NULL OR EXISTS (
                SELECT 1 FROM recipe_tags rt
                 WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
           AND ($3::bigint[] IS NULL OR EXISTS (
                SELECT 1 FROM recipe_ingredients ri
                 WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
         ORDER BY r.id DESC
        "#
    ))
    .bind(user_id)
    .bind(filter.tag_ids.as_deref())
    .bind(filter.ingredient_ids.as_deref())
    .fetch_all(db)
    .await
    .context("list recipes")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, user_id: Uuid, id: i64) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get recipe")?;
    Ok(row)
}

pub async fn insert(conn: &mut PgConnection, user_id: Uuid, new: &NewRecipe) -> anyhow::Result<Recipe> {
    let row = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        INSERT INTO recipes (user_id, title, time_minutes, price, description, link)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {RECIPE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&new.title)
    .bind(new.time_minutes)
    .bind(new.price)
    .bind(&new.description)
    .bind(&new.link)
    .fetch_one(&mut *conn)
    .await
    .context("insert recipe")?;
    Ok(row)
}

pub async fn update(
    conn: &mut PgConnection,
    user_id: Uuid,
    id: i64,
    changes: &RecipeChanges,
) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, Recipe>(&format!(
        r#"
        UPDATE recipes
           SET title = COALESCE($3, title),
               time_minutes = COALESCE($4, time_minutes),
               price = COALESCE($5, price),
               description = COALESCE($6, description),
               link = COALESCE($7, link)
         WHERE id = $1 AND user_id = $2
        RETURNING {RECIPE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(changes.title.as_deref())
    .bind(changes.time_minutes)
    .bind(changes.price)
    .bind(changes.description.as_deref())
    .bind(changes.link.as_deref())
    .fetch_optional(&mut *conn)
    .await
    .context("update recipe")?;
    Ok(row)
}

/// Points the recipe at a new image key, returning the key it replaced.
/// `None` when the recipe is not the user's.
pub async fn set_image(
    db: &PgPool,
    user_id: Uuid,
    id: i64,
    key: &str,
) -> anyhow::Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        r#"
        UPDATE recipes r
           SET image = $3
          FROM (SELECT id, image FROM recipes WHERE id = $1 AND user_id = $2 FOR UPDATE) old
         WHERE r.id = old.id
        RETURNING old.image
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(key)
    .fetch_optional(db)
    .await
    .context("set recipe image")?;
    Ok(row.map(|(old,)| old))
}

/// Deletes the recipe, returning its image key. `None` when nothing matched.
pub async fn delete(db: &PgPool, user_id: Uuid, id: i64) -> anyhow::Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("DELETE FROM recipes WHERE id = $1 AND user_id = $2 RETURNING image")
            .bind(id)
            .bind(user_id)
            .fetch_optional(db)
            .await
            .context("delete recipe")?;
    Ok(row.map(|(image,)| image))
}
