use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::AuthUser,
    error::{ApiError, JsonBody},
    state::AppState,
    validation::object_id,
};

use super::{
    dto::{RecipeDetail, RecipeFilterParams, RecipeImageResponse, RecipeRequest, RecipeSummary},
    images::check_image_blocking,
    repo, services,
};

const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/recipes/", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/recipes/:id/",
            get(get_recipe)
                .put(put_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipe/recipes/:id/upload-image/",
            post(upload_image).layer(DefaultBodyLimit::max(20 * 1024 * 1024)), // 20MB
        )
}

#[instrument(skip(state, params))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<RecipeFilterParams>,
) -> Result<Json<Vec<RecipeSummary>>, ApiError> {
    let filter = params.parse()?;
    let recipes = repo::list_by_user(&state.db, user_id, &filter).await?;
    Ok(Json(services::summaries(&state, &recipes).await?))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let id = object_id(&id)?;
    let recipe = repo::get(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(services::detail(&state, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<(StatusCode, HeaderMap, Json<RecipeDetail>), ApiError> {
    let input = payload.validate(false)?;
    let recipe = services::create_recipe(&state, user_id, input).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/recipe/recipes/{}/", recipe.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    let detail = services::detail(&state, recipe).await?;
    Ok((StatusCode::CREATED, headers, Json(detail)))
}

#[instrument(skip(state, payload))]
pub async fn put_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<Json<RecipeDetail>, ApiError> {
    update(state, user_id, &id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<Json<RecipeDetail>, ApiError> {
    update(state, user_id, &id, payload, true).await
}

async fn update(
    state: AppState,
    user_id: uuid::Uuid,
    raw_id: &str,
    payload: RecipeRequest,
    partial: bool,
) -> Result<Json<RecipeDetail>, ApiError> {
    let id = object_id(raw_id)?;
    let input = payload.validate(partial)?;
    let recipe = services::update_recipe(&state, user_id, id, input)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(services::detail(&state, recipe).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = object_id(&id)?;
    if !services::delete_recipe(&state, user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST multipart with an `image` file field.
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    mut mp: Multipart,
) -> Result<Json<RecipeImageResponse>, ApiError> {
    let id = object_id(&id)?;
    if repo::get(&state.db, user_id, id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            upload = Some(data);
        }
    }
    let Some(data) = upload else {
        return Err(ApiError::field("image", "No file was submitted."));
    };
    if data.is_empty() {
        return Err(ApiError::field("image", "The submitted file is empty."));
    }

    let image = match check_image_blocking(data).await {
        Ok(image) => image,
        Err(e) => {
            warn!(error = %e, recipe_id = id, "rejected upload");
            return Err(ApiError::field("image", INVALID_IMAGE));
        }
    };

    let url = services::attach_image(&state, user_id, id, image)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(RecipeImageResponse { id, image: url }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{app::build_app, recipes::images::sample_png, testing};

    const BOUNDARY: &str = "recipe-test-boundary";

    fn request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Token {token}"))
            .header("Content-Type", "application/json");
        match body {
            Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn multipart_request(uri: &str, token: &str, field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Authorization", format!("Token {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }

    async fn create(app: &testing::TestApp, token: &str, payload: Value) -> Value {
        let response = app
            .router
            .clone()
            .oneshot(request(Method::POST, "/recipe/recipes/", token, Some(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    fn sample() -> Value {
        json!({
            "title": "Sample Recipe",
            "time_minutes": 22,
            "price": "5.50",
            "description": "Sample Recipe Description",
            "link": "https://example.com/recipe.pdf",
        })
    }

    #[tokio::test]
    async fn auth_required() {
        for uri in [
            "/recipe/recipes/",
            "/recipe/recipes/1/",
        ] {
            let app = build_app(AppState::fake());
            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }

        let app = build_app(AppState::fake());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/recipe/recipes/1/upload-image/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_is_401() {
        let app = build_app(AppState::fake());
        let response = app
            .oneshot(request(Method::GET, "/recipe/recipes/", "not-a-token", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "Invalid token.");
    }

    #[tokio::test]
    async fn deactivated_user_token_is_401() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);
        create(&app, &token, sample()).await;

        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(user.id)
            .execute(&app.state.db)
            .await
            .unwrap();

        for (method, uri, body) in [
            (Method::GET, "/recipe/recipes/", None),
            (Method::POST, "/recipe/recipes/", Some(sample())),
            (Method::GET, "/recipe/tags/", None),
            (Method::GET, "/recipe/ingredients/", None),
        ] {
            let response = app
                .router
                .clone()
                .oneshot(request(method, uri, &token, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body_json(response).await["detail"], "Invalid token.");
        }
    }

    #[tokio::test]
    async fn deleted_user_token_is_401_not_500() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&app.state.db)
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(request(Method::POST, "/recipe/recipes/", &token, Some(sample())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_is_limited_to_user_newest_first() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let other = app.create_user().await;
        let token = app.token_for(&user);

        let first = create(&app, &token, sample()).await;
        let second = create(&app, &token, sample()).await;
        create(&app, &app.token_for(&other), sample()).await;

        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, "/recipe/recipes/", &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], second["id"]);
        assert_eq!(items[1]["id"], first["id"]);
        assert!(items[0].get("description").is_none());
        assert_eq!(items[0]["price"], "5.50");
        assert_eq!(items[0]["tags"], json!([]));
    }

    #[tokio::test]
    async fn detail_has_description_and_cross_user_is_404() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);
        let created = create(&app, &token, sample()).await;
        assert_eq!(created["description"], "Sample Recipe Description");
        assert!(created["image"].is_null());

        let uri = format!("/recipe/recipes/{}/", created["id"]);
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, &uri, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, created);

        let other = app.create_user().await;
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, &uri, &app.token_for(&other), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_with_tags_and_replace_on_update() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);

        let mut payload = sample();
        payload["tags"] = json!([{ "name": "Thai" }, { "name": "Dinner" }]);
        payload["ingredients"] = json!([{ "name": "Prawns" }]);
        let created = create(&app, &token, payload.clone()).await;
        assert_eq!(created["tags"].as_array().unwrap().len(), 2);
        assert_eq!(created["ingredients"][0]["name"], "Prawns");

        // same names again: rows are reused
        let again = create(&app, &token, payload).await;
        assert_eq!(again["tags"], created["tags"]);

        let uri = format!("/recipe/recipes/{}/", created["id"]);
        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::PATCH,
                &uri,
                &token,
                Some(json!({ "tags": [{ "name": "Lunch" }] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let tags = body["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0]["name"], "Lunch");
        assert_eq!(body["ingredients"], created["ingredients"]);
    }

    #[tokio::test]
    async fn full_update_and_delete() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);
        let created = create(&app, &token, sample()).await;
        let uri = format!("/recipe/recipes/{}/", created["id"]);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::PUT,
                &uri,
                &token,
                Some(json!({
                    "title": "New recipe title",
                    "time_minutes": 10,
                    "price": 2.5,
                    "link": "https://example.com/new-recipe.pdf",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "New recipe title");
        assert_eq!(body["price"], "2.50");
        assert_eq!(body["description"], "Sample Recipe Description");

        let response = app
            .router
            .clone()
            .oneshot(request(Method::PUT, &uri, &token, Some(json!({ "title": "x" }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .router
            .clone()
            .oneshot(request(Method::DELETE, &uri, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, &uri, &token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn filter_by_tags() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);

        let mut vegan = sample();
        vegan["tags"] = json!([{ "name": "Vegan" }]);
        let vegan = create(&app, &token, vegan).await;
        create(&app, &token, sample()).await;

        let uri = format!("/recipe/recipes/?tags={}", vegan["tags"][0]["id"]);
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, &uri, &token, None))
            .await
            .unwrap();
        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], vegan["id"]);
    }

    #[tokio::test]
    async fn upload_valid_image() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);
        let created = create(&app, &token, sample()).await;
        let uri = format!("/recipe/recipes/{}/upload-image/", created["id"]);

        let response = app
            .router
            .clone()
            .oneshot(multipart_request(&uri, &token, "image", &sample_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let url = body["image"].as_str().unwrap().to_string();
        assert!(url.starts_with("/media/uploads/recipe/"));
        let key = url.trim_start_matches("/media/");
        assert!(app.media.path().join(key).exists());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(url.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/recipe/recipes/{}/", created["id"]),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["image"], url.as_str());
    }

    #[tokio::test]
    async fn upload_bad_image() {
        let Some(app) = testing::TestApp::new().await else { return };
        let user = app.create_user().await;
        let token = app.token_for(&user);
        let created = create(&app, &token, sample()).await;
        let uri = format!("/recipe/recipes/{}/upload-image/", created["id"]);

        let response = app
            .router
            .clone()
            .oneshot(multipart_request(&uri, &token, "image", b"notimage"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await.get("image").is_some());

        let response = app
            .router
            .clone()
            .oneshot(multipart_request(&uri, &token, "photo", &sample_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
