use std::fmt;
use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{favorite, ingredient, ingredient_quantity, meal, menu, recipe, user};

/// Course a recipe or meal belongs to. Stored as its display value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub(crate) enum MealType {
    #[serde(rename = "Entrée")]
    Entree,
    Plat,
    Dessert,
}

#[derive(Debug, Error)]
#[error("unknown meal type '{0}', expected one of Entrée, Plat, Dessert")]
pub(crate) struct UnknownMealType(String);

impl MealType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MealType::Entree => "Entrée",
            MealType::Plat => "Plat",
            MealType::Dessert => "Dessert",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = UnknownMealType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entrée" => Ok(MealType::Entree),
            "Plat" => Ok(MealType::Plat),
            "Dessert" => Ok(MealType::Dessert),
            other => Err(UnknownMealType(other.to_string())),
        }
    }
}

impl ToSql<Text, Sqlite> for MealType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for MealType {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user)]
pub(crate) struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
}

#[derive(Insertable)]
#[diesel(table_name = user)]
pub(crate) struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = ingredient)]
pub(crate) struct Ingredient {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = ingredient)]
pub(crate) struct NewIngredient<'a> {
    pub name: &'a str,
}

// full row for as_select(); name_key is only matched in filters, never read back
#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = recipe)]
pub(crate) struct Recipe {
    pub id: i32,
    pub name: String,
    pub name_key: String,
    pub meal_type: Option<MealType>,
    pub steps: Option<String>,
    pub servings: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = recipe)]
pub(crate) struct NewRecipe<'a> {
    pub name: &'a str,
    pub name_key: &'a str,
    pub meal_type: Option<MealType>,
    pub steps: Option<&'a str>,
    pub servings: Option<i32>,
}

// one row per ingredient used by a recipe
#[derive(Insertable)]
#[diesel(table_name = ingredient_quantity)]
pub(crate) struct NewIngredientQuantity<'a> {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub quantity: f64,
    pub unit: Option<&'a str>,
}

// menus only read meal_type; recipe_id stays so the row mirrors the table
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, Queryable, Selectable)]
#[diesel(table_name = meal)]
pub(crate) struct Meal {
    pub id: i32,
    pub meal_type: MealType,
    pub recipe_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = meal)]
pub(crate) struct NewMeal {
    pub meal_type: MealType,
    pub recipe_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = menu)]
pub(crate) struct Menu {
    pub id: i32,
    pub name: String,
    pub entree_id: Option<i32>,
    pub plat_id: Option<i32>,
    pub dessert_id: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = menu)]
pub(crate) struct NewMenu<'a> {
    pub name: &'a str,
    pub entree_id: Option<i32>,
    pub plat_id: Option<i32>,
    pub dessert_id: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = favorite)]
pub(crate) struct NewFavorite {
    pub user_id: i32,
    pub recipe_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IngredientAmount {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecipeInput {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
    #[serde(default)]
    pub steps: Option<String>,
    #[serde(default)]
    pub servings: Option<i32>,
    #[serde(default)]
    pub meal_type: Option<MealType>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MenuInput {
    pub name: String,
    #[serde(default)]
    pub entree_id: Option<i32>,
    #[serde(default)]
    pub plat_id: Option<i32>,
    #[serde(default)]
    pub dessert_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
pub(crate) struct RecipeSummary {
    pub id: i32,
    pub name: String,
    pub meal_type: Option<MealType>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
pub(crate) struct IngredientLine {
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RecipeDetail {
    pub id: i32,
    pub name: String,
    pub ingredients: Vec<IngredientLine>,
    pub steps: Option<String>,
    pub servings: Option<i32>,
    pub meal_type: Option<MealType>,
}

/// A menu with each course slot resolved to the referenced meal's type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MenuView {
    pub id: i32,
    pub name: String,
    pub entree: Option<MealType>,
    pub plat: Option<MealType>,
    pub dessert: Option<MealType>,
}
