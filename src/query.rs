use std::collections::{BTreeSet, HashMap, HashSet};

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};

use crate::error::{AppError, AppResult};
use crate::models::{
    Ingredient, IngredientLine, Meal, MealType, Menu, MenuInput, MenuView, NewFavorite,
    NewIngredient, NewIngredientQuantity, NewMeal, NewMenu, NewRecipe, NewUser, Recipe,
    RecipeDetail, RecipeInput, RecipeSummary, User,
};
use crate::password;
use crate::schema::{favorite, ingredient, ingredient_quantity, meal, menu, recipe, user};

/// Inserted (if missing) the first time a process lists ingredients.
pub(crate) const SEED_INGREDIENTS: [&str; 50] = [
    "Sel", "Poivre", "Huile d'olive", "Ail", "Oignon", "Basilic",
    "Thym", "Romarin", "Persil", "Ciboulette", "Coriandre", "Menthe",
    "Paprika", "Cumin", "Curcuma", "Moutarde", "Vinaigre balsamique",
    "Vinaigre de vin rouge", "Sauce soja", "Miel", "Sirop d'érable",
    "Citron", "Jus d'orange", "Tomate", "Concentré de tomate",
    "Pomme de terre", "Carotte", "Poivron", "Courgette", "Brocoli",
    "Champignon", "Épinards", "Laitue", "Poisson", "Poulet", "Bœuf",
    "Pâtes", "Riz", "Quinoa", "Farine", "Sucre", "Œuf", "Fromage",
    "Crème fraîche", "Yaourt", "Noix", "Amandes", "Pignons de pin", "Cacahuette", "Salade",
];

/// Canonical form used for every case-insensitive name column.
pub(crate) fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Login {
    Authenticated(i32),
    Registered(i32),
    WrongPassword,
}

pub(crate) fn login_or_register(
    conn: &mut SqliteConnection,
    username: &str,
    password: &str,
) -> AppResult<Login> {
    let username = normalize(username);
    if username.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "username and password are both required".to_string(),
        ));
    }

    if let Some(existing) = find_user_by_name(conn, &username)? {
        return authenticate(&existing, password);
    }

    let digest = password::hash_password(password)?;
    let inserted = diesel::insert_into(user::table)
        .values(&NewUser {
            username: &username,
            password_hash: &digest,
        })
        .returning(user::id)
        .get_result::<i32>(conn);

    match inserted {
        Ok(id) => Ok(Login::Registered(id)),
        // a concurrent registration got there first
        Err(e) if is_unique_violation(&e) => match find_user_by_name(conn, &username)? {
            Some(existing) => authenticate(&existing, password),
            None => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

fn authenticate(existing: &User, password: &str) -> AppResult<Login> {
    if password::verify_password(password, &existing.password_hash)? {
        Ok(Login::Authenticated(existing.id))
    } else {
        Ok(Login::WrongPassword)
    }
}

fn find_user_by_name(conn: &mut SqliteConnection, username: &str) -> QueryResult<Option<User>> {
    user::table
        .filter(user::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()
}

fn require_user(conn: &mut SqliteConnection, user_id: i32) -> AppResult<User> {
    user::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", user_id)))
}

fn require_recipe(conn: &mut SqliteConnection, recipe_id: i32) -> AppResult<()> {
    recipe::table
        .find(recipe_id)
        .select(recipe::id)
        .first::<i32>(conn)
        .optional()?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("recipe {} not found", recipe_id)))
}

pub(crate) fn list_ingredient_names(conn: &mut SqliteConnection) -> AppResult<Vec<String>> {
    let names = ingredient::table
        .select(ingredient::name)
        .order(ingredient::id.asc())
        .load(conn)?;
    Ok(names)
}

/// Names containing `fragment`, ignoring case; an empty fragment lists everything.
pub(crate) fn search_ingredient_names(
    conn: &mut SqliteConnection,
    fragment: &str,
) -> AppResult<Vec<String>> {
    let fragment = normalize(fragment);
    if fragment.is_empty() {
        return list_ingredient_names(conn);
    }
    let pattern = format!("%{}%", escape_like(&fragment));
    let names = ingredient::table
        .filter(ingredient::name.like(pattern).escape('\\'))
        .select(ingredient::name)
        .order(ingredient::id.asc())
        .load(conn)?;
    Ok(names)
}

/// Inserts the missing seed ingredients and returns how many were added.
pub(crate) fn seed_ingredients(conn: &mut SqliteConnection) -> AppResult<usize> {
    let added = conn.immediate_transaction::<_, DieselError, _>(|conn| {
        let mut added = 0;
        for name in SEED_INGREDIENTS {
            let name = normalize(name);
            added += diesel::insert_or_ignore_into(ingredient::table)
                .values(&NewIngredient { name: &name })
                .execute(conn)?;
        }
        Ok(added)
    })?;
    Ok(added)
}

pub(crate) fn create_ingredient(conn: &mut SqliteConnection, name: &str) -> AppResult<Ingredient> {
    let name = normalize(name);
    if name.is_empty() {
        return Err(AppError::Validation(
            "ingredient name must not be empty".to_string(),
        ));
    }
    if find_ingredient(conn, &name)?.is_some() {
        return Err(AppError::Conflict(format!(
            "ingredient '{}' already exists",
            name
        )));
    }

    conn.immediate_transaction::<_, DieselError, _>(|conn| {
        diesel::insert_into(ingredient::table)
            .values(&NewIngredient { name: &name })
            .returning(Ingredient::as_returning())
            .get_result(conn)
    })
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("ingredient '{}' already exists", name))
        } else {
            e.into()
        }
    })
}

fn find_ingredient(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Ingredient>> {
    ingredient::table
        .filter(ingredient::name.eq(name))
        .select(Ingredient::as_select())
        .first(conn)
        .optional()
}

// Expects an already normalized name.
fn find_or_create_ingredient(conn: &mut SqliteConnection, name: &str) -> QueryResult<Ingredient> {
    if let Some(found) = find_ingredient(conn, name)? {
        return Ok(found);
    }
    let inserted = diesel::insert_into(ingredient::table)
        .values(&NewIngredient { name })
        .returning(Ingredient::as_returning())
        .get_result(conn);
    match inserted {
        Err(e) if is_unique_violation(&e) => ingredient::table
            .filter(ingredient::name.eq(name))
            .select(Ingredient::as_select())
            .first(conn),
        other => other,
    }
}

/// Sorted, deduplicated ingredient names used by recipes serving exactly `servings`.
pub(crate) fn ingredient_names_for_servings(
    conn: &mut SqliteConnection,
    servings: i32,
) -> AppResult<Vec<String>> {
    let names: Vec<String> = recipe::table
        .inner_join(ingredient_quantity::table.inner_join(ingredient::table))
        .filter(recipe::servings.eq(servings))
        .select(ingredient::name)
        .load(conn)?;
    Ok(names.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecipeFilter {
    /// Case-insensitive substring of any ingredient name.
    pub ingredient_name: Option<String>,
    /// Ingredient names that must all be used by the recipe.
    pub constraints: Vec<String>,
}

pub(crate) fn list_recipes(
    conn: &mut SqliteConnection,
    filter: &RecipeFilter,
) -> AppResult<Vec<RecipeSummary>> {
    let required: BTreeSet<String> = filter
        .constraints
        .iter()
        .map(|c| normalize(c))
        .filter(|c| !c.is_empty())
        .collect();

    let satisfying = if required.is_empty() {
        None
    } else {
        let wanted: Vec<String> = required.iter().cloned().collect();
        let uses: Vec<(i32, i32)> = ingredient_quantity::table
            .inner_join(ingredient::table)
            .filter(ingredient::name.eq_any(wanted))
            .select((ingredient_quantity::recipe_id, ingredient_quantity::ingredient_id))
            .load(conn)?;
        let mut per_recipe: HashMap<i32, HashSet<i32>> = HashMap::new();
        for (recipe_id, ingredient_id) in uses {
            per_recipe.entry(recipe_id).or_default().insert(ingredient_id);
        }
        Some(
            per_recipe
                .into_iter()
                .filter(|(_, found)| found.len() == required.len())
                .map(|(recipe_id, _)| recipe_id)
                .collect::<Vec<i32>>(),
        )
    };

    let containing = match filter
        .ingredient_name
        .as_deref()
        .map(normalize)
        .filter(|f| !f.is_empty())
    {
        Some(fragment) => {
            let pattern = format!("%{}%", escape_like(&fragment));
            let ids: Vec<i32> = ingredient_quantity::table
                .inner_join(ingredient::table)
                .filter(ingredient::name.like(pattern).escape('\\'))
                .select(ingredient_quantity::recipe_id)
                .distinct()
                .load(conn)?;
            Some(ids)
        }
        None => None,
    };

    let mut query = recipe::table
        .select((recipe::id, recipe::name, recipe::meal_type))
        .order(recipe::id.asc())
        .into_boxed::<Sqlite>();
    if let Some(ids) = containing {
        query = query.filter(recipe::id.eq_any(ids));
    }
    if let Some(ids) = satisfying {
        query = query.filter(recipe::id.eq_any(ids));
    }

    Ok(query.load::<RecipeSummary>(conn)?)
}

pub(crate) fn create_recipe(conn: &mut SqliteConnection, input: &RecipeInput) -> AppResult<i32> {
    let name = input.name.trim();
    let name_key = normalize(name);
    if name_key.is_empty() {
        return Err(AppError::Validation("recipe name must not be empty".to_string()));
    }
    if matches!(input.servings, Some(s) if s <= 0) {
        return Err(AppError::Validation("servings must be positive".to_string()));
    }
    let mut amounts = Vec::with_capacity(input.ingredients.len());
    for item in &input.ingredients {
        let ingredient_name = normalize(&item.name);
        if ingredient_name.is_empty() {
            return Err(AppError::Validation(
                "ingredient name must not be empty".to_string(),
            ));
        }
        if !item.quantity.is_finite() || item.quantity < 0.0 {
            return Err(AppError::Validation(format!(
                "invalid quantity for '{}'",
                ingredient_name
            )));
        }
        amounts.push((ingredient_name, item.quantity, item.unit.as_deref()));
    }

    let taken = recipe::table
        .filter(recipe::name_key.eq(&name_key))
        .select(recipe::id)
        .first::<i32>(conn)
        .optional()?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!("recipe '{}' already exists", name)));
    }

    let recipe_id = conn.immediate_transaction::<_, DieselError, _>(|conn| {
        let mut ingredient_ids = Vec::with_capacity(amounts.len());
        for (ingredient_name, _, _) in &amounts {
            ingredient_ids.push(find_or_create_ingredient(conn, ingredient_name)?.id);
        }

        let recipe_id = diesel::insert_into(recipe::table)
            .values(&NewRecipe {
                name,
                name_key: &name_key,
                meal_type: input.meal_type,
                steps: input.steps.as_deref(),
                servings: input.servings,
            })
            .returning(recipe::id)
            .get_result::<i32>(conn)?;

        for (ingredient_id, (_, quantity, unit)) in ingredient_ids.into_iter().zip(&amounts) {
            diesel::insert_into(ingredient_quantity::table)
                .values(&NewIngredientQuantity {
                    recipe_id,
                    ingredient_id,
                    quantity: *quantity,
                    unit: *unit,
                })
                .execute(conn)?;
        }
        Ok(recipe_id)
    })?;

    Ok(recipe_id)
}

pub(crate) fn find_recipe_detail(conn: &mut SqliteConnection, name: &str) -> AppResult<RecipeDetail> {
    let found = recipe::table
        .filter(recipe::name_key.eq(normalize(name)))
        .select(Recipe::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("no recipe named '{}'", name.trim())))?;

    let ingredients = ingredient_quantity::table
        .inner_join(ingredient::table)
        .filter(ingredient_quantity::recipe_id.eq(found.id))
        .select((
            ingredient::name,
            ingredient_quantity::quantity,
            ingredient_quantity::unit,
        ))
        .order(ingredient_quantity::id.asc())
        .load::<IngredientLine>(conn)?;

    Ok(RecipeDetail {
        id: found.id,
        name: found.name,
        ingredients,
        steps: found.steps,
        servings: found.servings,
        meal_type: found.meal_type,
    })
}

pub(crate) fn recipe_steps(conn: &mut SqliteConnection, recipe_id: i32) -> AppResult<Option<String>> {
    recipe::table
        .find(recipe_id)
        .select(recipe::steps)
        .first::<Option<String>>(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("recipe {} not found", recipe_id)))
}

/// The recipe id is only checked by its foreign key.
pub(crate) fn create_meal(
    conn: &mut SqliteConnection,
    meal_type: MealType,
    recipe_id: i32,
) -> AppResult<i32> {
    let id = diesel::insert_into(meal::table)
        .values(&NewMeal {
            meal_type,
            recipe_id,
        })
        .returning(meal::id)
        .get_result(conn)?;
    Ok(id)
}

pub(crate) fn delete_meal(conn: &mut SqliteConnection, meal_id: i32) -> AppResult<()> {
    let deleted = diesel::delete(meal::table.find(meal_id)).execute(conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("meal {} not found", meal_id)));
    }
    Ok(())
}

pub(crate) fn create_menu(conn: &mut SqliteConnection, input: &MenuInput) -> AppResult<i32> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("menu name must not be empty".to_string()));
    }
    let id = diesel::insert_into(menu::table)
        .values(&NewMenu {
            name,
            entree_id: input.entree_id,
            plat_id: input.plat_id,
            dessert_id: input.dessert_id,
        })
        .returning(menu::id)
        .get_result(conn)?;
    Ok(id)
}

pub(crate) fn list_menus(conn: &mut SqliteConnection) -> AppResult<Vec<MenuView>> {
    let menus = menu::table
        .select(Menu::as_select())
        .order(menu::id.asc())
        .load(conn)?;
    let meal_types: HashMap<i32, MealType> = meal::table
        .select(Meal::as_select())
        .load(conn)?
        .into_iter()
        .map(|m| (m.id, m.meal_type))
        .collect();
    let resolve = |slot: Option<i32>| slot.and_then(|id| meal_types.get(&id).copied());

    Ok(menus
        .into_iter()
        .map(|m| MenuView {
            id: m.id,
            entree: resolve(m.entree_id),
            plat: resolve(m.plat_id),
            dessert: resolve(m.dessert_id),
            name: m.name,
        })
        .collect())
}

pub(crate) fn delete_menu(conn: &mut SqliteConnection, menu_id: i32) -> AppResult<()> {
    let deleted = diesel::delete(menu::table.find(menu_id)).execute(conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("menu {} not found", menu_id)));
    }
    Ok(())
}

pub(crate) fn add_favorite(conn: &mut SqliteConnection, user_id: i32, recipe_id: i32) -> AppResult<()> {
    require_user(conn, user_id)?;
    require_recipe(conn, recipe_id)?;

    let already = favorite::table
        .filter(favorite::user_id.eq(user_id))
        .filter(favorite::recipe_id.eq(recipe_id))
        .select(favorite::id)
        .first::<i32>(conn)
        .optional()?;
    let duplicate = || AppError::Conflict(format!("recipe {} is already a favorite", recipe_id));
    if already.is_some() {
        return Err(duplicate());
    }

    match diesel::insert_into(favorite::table)
        .values(&NewFavorite { user_id, recipe_id })
        .execute(conn)
    {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(duplicate()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn remove_favorite(
    conn: &mut SqliteConnection,
    user_id: i32,
    recipe_id: i32,
) -> AppResult<()> {
    require_user(conn, user_id)?;
    require_recipe(conn, recipe_id)?;

    let deleted = diesel::delete(
        favorite::table
            .filter(favorite::user_id.eq(user_id))
            .filter(favorite::recipe_id.eq(recipe_id)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!(
            "recipe {} is not a favorite",
            recipe_id
        )));
    }
    Ok(())
}

/// Returns the user together with their favorite recipe names, oldest first.
pub(crate) fn list_favorites(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> AppResult<(User, Vec<String>)> {
    let owner = require_user(conn, user_id)?;
    let names = favorite::table
        .inner_join(recipe::table)
        .filter(favorite::user_id.eq(user_id))
        .select(recipe::name)
        .order(favorite::id.asc())
        .load(conn)?;
    Ok((owner, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::IngredientAmount;

    fn recipe_input(name: &str, ingredients: &[(&str, f64)], servings: Option<i32>) -> RecipeInput {
        RecipeInput {
            name: name.to_string(),
            ingredients: ingredients
                .iter()
                .map(|(n, q)| IngredientAmount {
                    name: n.to_string(),
                    quantity: *q,
                    unit: None,
                })
                .collect(),
            steps: None,
            servings,
            meal_type: None,
        }
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("ail"), "ail");
    }

    #[test]
    fn seeding_is_idempotent() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        assert_eq!(seed_ingredients(&mut conn).unwrap(), SEED_INGREDIENTS.len());
        assert_eq!(seed_ingredients(&mut conn).unwrap(), 0);
        let names = list_ingredient_names(&mut conn).unwrap();
        assert_eq!(names.len(), SEED_INGREDIENTS.len());
        assert!(names.contains(&"épinards".to_string()));
    }

    #[test]
    fn ingredient_names_are_unique_ignoring_case() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let created = create_ingredient(&mut conn, "Tomate").unwrap();
        assert_eq!(created.name, "tomate");
        assert!(matches!(
            create_ingredient(&mut conn, "  TOMATE "),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            create_ingredient(&mut conn, "   "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn failed_recipe_leaves_no_partial_rows() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let err = create_recipe(
            &mut conn,
            &recipe_input("Doublon", &[("Sucre", 1.0), ("sucre", 2.0)], None),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(list_recipes(&mut conn, &RecipeFilter::default())
            .unwrap()
            .is_empty());
        assert!(list_ingredient_names(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn constraints_require_every_ingredient() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        create_recipe(&mut conn, &recipe_input("Omelette", &[("Œuf", 3.0), ("Sel", 1.0)], Some(1))).unwrap();
        create_recipe(&mut conn, &recipe_input("Oeuf dur", &[("Œuf", 1.0)], Some(1))).unwrap();

        let filter = RecipeFilter {
            ingredient_name: None,
            constraints: vec!["œuf".to_string(), "SEL".to_string()],
        };
        let found = list_recipes(&mut conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Omelette");

        let unknown = RecipeFilter {
            ingredient_name: None,
            constraints: vec!["truffe".to_string()],
        };
        assert!(list_recipes(&mut conn, &unknown).unwrap().is_empty());
    }

    #[test]
    fn servings_union_is_deduplicated_and_sorted() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        create_recipe(&mut conn, &recipe_input("Salade", &[("Tomate", 2.0), ("Laitue", 1.0)], Some(2))).unwrap();
        create_recipe(&mut conn, &recipe_input("Bruschetta", &[("Tomate", 1.0), ("Ail", 1.0)], Some(2))).unwrap();
        create_recipe(&mut conn, &recipe_input("Riz", &[("Riz", 1.0)], Some(4))).unwrap();

        assert_eq!(
            ingredient_names_for_servings(&mut conn, 2).unwrap(),
            vec!["ail", "laitue", "tomate"]
        );
        assert!(ingredient_names_for_servings(&mut conn, 3).unwrap().is_empty());
    }

    #[test]
    fn non_finite_quantity_and_empty_servings_are_invalid() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        assert!(matches!(
            create_recipe(&mut conn, &recipe_input("Sauce", &[("Tomate", f64::NAN)], None)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_recipe(&mut conn, &recipe_input("Sauce", &[("Tomate", f64::INFINITY)], None)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_recipe(&mut conn, &recipe_input("Sauce", &[], Some(-2))),
            Err(AppError::Validation(_))
        ));
        assert!(list_ingredient_names(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn like_metacharacters_do_not_act_as_wildcards() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        create_ingredient(&mut conn, "Sauce 100% tomate").unwrap();
        create_ingredient(&mut conn, "Sel").unwrap();
        create_recipe(&mut conn, &recipe_input("Salé", &[("Sel", 1.0)], None)).unwrap();

        for fragment in ["%", "_"] {
            let filter = RecipeFilter {
                ingredient_name: Some(fragment.to_string()),
                constraints: Vec::new(),
            };
            assert!(list_recipes(&mut conn, &filter).unwrap().is_empty());
        }
        assert_eq!(
            search_ingredient_names(&mut conn, "%").unwrap(),
            vec!["sauce 100% tomate"]
        );
        assert!(search_ingredient_names(&mut conn, "_").unwrap().is_empty());
        assert_eq!(search_ingredient_names(&mut conn, " ").unwrap().len(), 2);
    }
}
