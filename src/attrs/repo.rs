use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// The two per-user label kinds a recipe links to. They share one schema
/// shape, so every query here is parameterized by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Tag,
    Ingredient,
}

impl AttrKind {
    pub fn table(self) -> &'static str {
        match self {
            AttrKind::Tag => "tags",
            AttrKind::Ingredient => "ingredients",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            AttrKind::Tag => "recipe_tags",
            AttrKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag_id",
            AttrKind::Ingredient => "ingredient_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag",
            AttrKind::Ingredient => "ingredient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Attr {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, FromRow)]
struct LinkedAttr {
    recipe_id: i64,
    id: i64,
    name: String,
}

/// The caller's rows ordered by name descending. With `assigned_only`, only
/// rows linked to at least one recipe, each listed once.
pub async fn list(
    db: &PgPool,
    kind: AttrKind,
    user_id: Uuid,
    assigned_only: bool,
) -> anyhow::Result<Vec<Attr>> {
    let sql = format!(
        r#"
        SELECT a.id, a.name
          FROM {table} a
         WHERE a.user_id = $1
           AND ($2 = FALSE OR EXISTS (SELECT 1 FROM {link} l WHERE l.{col} = a.id))
         ORDER BY a.name DESC, a.id DESC
        "#,
        table = kind.table(),
        link = kind.link_table(),
        col = kind.link_column(),
    );
    let rows = sqlx::query_as::<_, Attr>(&sql)
        .bind(user_id)
        .bind(assigned_only)
        .fetch_all(db)
        .await
        .with_context(|| format!("list {}", kind.table()))?;
    Ok(rows)
}

pub async fn get(db: &PgPool, kind: AttrKind, user_id: Uuid, id: i64) -> anyhow::Result<Option<Attr>> {
    let sql = format!(
        "SELECT id, name FROM {} WHERE id = $1 AND user_id = $2",
        kind.table()
    );
    let row = sqlx::query_as::<_, Attr>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .with_context(|| format!("get {}", kind.label()))?;
    Ok(row)
}

pub async fn rename(
    db: &PgPool,
    kind: AttrKind,
    user_id: Uuid,
    id: i64,
    name: &str,
) -> anyhow::Result<Option<Attr>> {
    let sql = format!(
        "UPDATE {} SET name = $3 WHERE id = $1 AND user_id = $2 RETURNING id, name",
        kind.table()
    );
    let row = sqlx::query_as::<_, Attr>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(name)
        .fetch_optional(db)
        .await
        .with_context(|| format!("rename {}", kind.label()))?;
    Ok(row)
}

/// Returns false when no row of the caller's matched.
pub async fn delete(db: &PgPool, kind: AttrKind, user_id: Uuid, id: i64) -> anyhow::Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", kind.table());
    let res = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .with_context(|| format!("delete {}", kind.label()))?;
    Ok(res.rows_affected() > 0)
}

/// Existing row with this name for the user, or a new one. The
/// `(user_id, name)` unique constraint makes concurrent calls converge on a
/// single row.
pub async fn get_or_create(
    conn: &mut PgConnection,
    kind: AttrKind,
    user_id: Uuid,
    name: &str,
) -> anyhow::Result<Attr> {
    let sql = format!(
        r#"
        INSERT INTO {} (user_id, name) VALUES ($1, $2)
        ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name
        "#,
        kind.table()
    );
    let row = sqlx::query_as::<_, Attr>(&sql)
        .bind(user_id)
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("get or create {} {name:?}", kind.label()))?;
    Ok(row)
}

/// Makes `ids` the complete set linked to the recipe.
pub async fn replace_links(
    conn: &mut PgConnection,
    kind: AttrKind,
    recipe_id: i64,
    ids: &[i64],
) -> anyhow::Result<()> {
    let link = kind.link_table();
    let col = kind.link_column();
    sqlx::query(&format!("DELETE FROM {link} WHERE recipe_id = $1"))
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("clear {link}"))?;
    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {link} (recipe_id, {col}) SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING"
        ))
        .bind(recipe_id)
        .bind(ids)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("fill {link}"))?;
    }
    Ok(())
}

/// Linked rows per recipe id, ordered by id. Recipes without links are absent.
pub async fn for_recipes(
    db: &PgPool,
    kind: AttrKind,
    recipe_ids: &[i64],
) -> anyhow::Result<HashMap<i64, Vec<Attr>>> {
    if recipe_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        r#"
        SELECT l.recipe_id, a.id, a.name
          FROM {link} l
          JOIN {table} a ON a.id = l.{col}
         WHERE l.recipe_id = ANY($1)
         ORDER BY a.id
        "#,
        link = kind.link_table(),
        table = kind.table(),
        col = kind.link_column(),
    );
    let rows = sqlx::query_as::<_, LinkedAttr>(&sql)
        .bind(recipe_ids)
        .fetch_all(db)
        .await
        .with_context(|| format!("load {} for recipes", kind.table()))?;

    let mut out: HashMap<i64, Vec<Attr>> = HashMap::new();
    for row in rows {
        out.entry(row.recipe_id).or_default().push(Attr {
            id: row.id,
            name: row.name,
        });
    }
    Ok(out)
}
