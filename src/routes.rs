use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{MealType, MenuInput, RecipeInput};
use crate::query::{self, Login, RecipeFilter};

/// Tracks whether this process still owes the ingredient seed.
pub(crate) struct IngredientSeed {
    pending: AtomicBool,
}

impl IngredientSeed {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            pending: AtomicBool::new(enabled),
        }
    }

    fn claim(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    fn release(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct IngredientBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IngredientSearch {
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MealBody {
    #[serde(rename = "type")]
    meal_type: MealType,
    recipe_id: i32,
}

#[post("/users")]
async fn post_user(
    pool: web::Data<DbPool>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let credentials = body.into_inner();
    let outcome = web::block(move || {
        let mut conn = pool.get()?;
        query::login_or_register(&mut conn, &credentials.username, &credentials.password)
    })
    .await??;

    match outcome {
        Login::Authenticated(user_id) => Ok(HttpResponse::Ok().json(json!({
            "message": "logged in",
            "user_id": user_id,
        }))),
        Login::Registered(user_id) => {
            log::info!("registered user {}", user_id);
            Ok(HttpResponse::Created().json(json!({
                "message": "user created",
                "user_id": user_id,
            })))
        }
        Login::WrongPassword => Err(AppError::Unauthorized("wrong password".to_string())),
    }
}

#[get("/ingredients")]
async fn get_ingredients(
    pool: web::Data<DbPool>,
    seed: web::Data<IngredientSeed>,
    params: web::Query<IngredientSearch>,
) -> Result<HttpResponse, AppError> {
    let search = params.into_inner().search;
    let names = web::block(move || {
        let mut conn = pool.get()?;
        if seed.claim() {
            match query::seed_ingredients(&mut conn) {
                Ok(added) => log::info!("seeded {} ingredients", added),
                Err(e) => {
                    seed.release();
                    return Err(e);
                }
            }
        }
        match search.as_deref() {
            Some(fragment) => query::search_ingredient_names(&mut conn, fragment),
            None => query::list_ingredient_names(&mut conn),
        }
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "ingredients": names })))
}

#[post("/ingredients")]
async fn post_ingredient(
    pool: web::Data<DbPool>,
    body: web::Json<IngredientBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let created = web::block(move || {
        let mut conn = pool.get()?;
        query::create_ingredient(&mut conn, &body.name)
    })
    .await??;
    log::info!("created ingredient {} ({})", created.name, created.id);
    Ok(HttpResponse::Created().json(json!({
        "message": "ingredient created",
        "ingredient": created,
    })))
}

#[get("/ingredients/{servings}")]
async fn get_ingredients_for_servings(
    pool: web::Data<DbPool>,
    servings: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let servings = servings.into_inner();
    let names = web::block(move || {
        let mut conn = pool.get()?;
        query::ingredient_names_for_servings(&mut conn, servings)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "ingredients": names })))
}

// repeated keys (`constraints=a&constraints=b`) need the raw pair list
#[get("/recipes")]
async fn get_recipes(
    pool: web::Data<DbPool>,
    params: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let mut filter = RecipeFilter::default();
    for (key, value) in params.into_inner() {
        match key.as_str() {
            "ingredient_name" => filter.ingredient_name = Some(value),
            "constraints" => filter.constraints.push(value),
            _ => {}
        }
    }

    let recipes = web::block(move || {
        let mut conn = pool.get()?;
        query::list_recipes(&mut conn, &filter)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "recipes": recipes })))
}

#[post("/recipes")]
async fn post_recipe(
    pool: web::Data<DbPool>,
    body: web::Json<RecipeInput>,
) -> Result<HttpResponse, AppError> {
    let input = body.into_inner();
    let recipe_id = web::block(move || {
        let mut conn = pool.get()?;
        query::create_recipe(&mut conn, &input)
    })
    .await??;
    log::info!("created recipe {}", recipe_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "recipe created",
        "recipe_id": recipe_id,
    })))
}

#[get("/recipes/{name}")]
async fn get_recipe_by_name(
    pool: web::Data<DbPool>,
    name: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let name = name.into_inner();
    let detail = web::block(move || {
        let mut conn = pool.get()?;
        query::find_recipe_detail(&mut conn, &name)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "recipe": detail })))
}

#[get("/recipes/{recipe_id}/steps")]
async fn get_recipe_steps(
    pool: web::Data<DbPool>,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let recipe_id = recipe_id.into_inner();
    let steps = web::block(move || {
        let mut conn = pool.get()?;
        query::recipe_steps(&mut conn, recipe_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "recipe_id": recipe_id, "steps": steps })))
}

#[post("/meals")]
async fn post_meal(
    pool: web::Data<DbPool>,
    body: web::Json<MealBody>,
) -> Result<HttpResponse, AppError> {
    let MealBody {
        meal_type,
        recipe_id,
    } = body.into_inner();
    let meal_id = web::block(move || {
        let mut conn = pool.get()?;
        query::create_meal(&mut conn, meal_type, recipe_id)
    })
    .await??;
    log::info!("created {} meal {} for recipe {}", meal_type, meal_id, recipe_id);
    Ok(HttpResponse::Created().json(json!({
        "message": format!("{} created successfully", meal_type),
        "meal_id": meal_id,
    })))
}

#[delete("/meals/{meal_id}")]
async fn delete_meal(
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let meal_id = meal_id.into_inner();
    web::block(move || {
        let mut conn = pool.get()?;
        query::delete_meal(&mut conn, meal_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "message": "meal deleted" })))
}

#[get("/menus")]
async fn get_menus(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let menus = web::block(move || {
        let mut conn = pool.get()?;
        query::list_menus(&mut conn)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "menus": menus })))
}

#[post("/menus")]
async fn post_menu(
    pool: web::Data<DbPool>,
    body: web::Json<MenuInput>,
) -> Result<HttpResponse, AppError> {
    let input = body.into_inner();
    let menu_id = web::block(move || {
        let mut conn = pool.get()?;
        query::create_menu(&mut conn, &input)
    })
    .await??;
    log::info!("created menu {}", menu_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "menu created",
        "menu_id": menu_id,
    })))
}

#[delete("/menus/{menu_id}")]
async fn delete_menu(
    pool: web::Data<DbPool>,
    menu_id: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let menu_id = menu_id.into_inner();
    web::block(move || {
        let mut conn = pool.get()?;
        query::delete_menu(&mut conn, menu_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "message": "menu deleted" })))
}

#[post("/users/{user_id}/recipes/{recipe_id}/favorite")]
async fn post_favorite(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, recipe_id) = path.into_inner();
    web::block(move || {
        let mut conn = pool.get()?;
        query::add_favorite(&mut conn, user_id, recipe_id)
    })
    .await??;
    log::info!("user {} favorited recipe {}", user_id, recipe_id);
    Ok(HttpResponse::Created().json(json!({ "message": "recipe added to favorites" })))
}

#[delete("/users/{user_id}/recipes/{recipe_id}/favorite")]
async fn delete_favorite(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, recipe_id) = path.into_inner();
    web::block(move || {
        let mut conn = pool.get()?;
        query::remove_favorite(&mut conn, user_id, recipe_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({ "message": "recipe removed from favorites" })))
}

#[get("/users/{user_id}/favorites")]
async fn get_favorites(
    pool: web::Data<DbPool>,
    user_id: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    let (owner, favorite_recipes) = web::block(move || {
        let mut conn = pool.get()?;
        query::list_favorites(&mut conn, user_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({
        "user_id": owner.id,
        "username": owner.username,
        "favorite_recipes": favorite_recipes,
    })))
}

/// Registers every endpoint plus extractor configs that answer bad input with a JSON 400.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .service(post_user)
    .service(get_ingredients)
    .service(post_ingredient)
    .service(get_ingredients_for_servings)
    .service(get_recipes)
    .service(post_recipe)
    .service(get_recipe_by_name)
    .service(get_recipe_steps)
    .service(post_meal)
    .service(delete_meal)
    .service(get_menus)
    .service(post_menu)
    .service(delete_menu)
    .service(post_favorite)
    .service(delete_favorite)
    .service(get_favorites);
}
