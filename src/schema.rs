diesel::table! {
    user (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
    }
}

diesel::table! {
    ingredient (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    recipe (id) {
        id -> Integer,
        name -> Text,
        name_key -> Text,
        meal_type -> Nullable<Text>,
        steps -> Nullable<Text>,
        servings -> Nullable<Integer>,
    }
}

diesel::table! {
    ingredient_quantity (id) {
        id -> Integer,
        recipe_id -> Integer,
        ingredient_id -> Integer,
        quantity -> Double,
        unit -> Nullable<Text>,
    }
}

diesel::table! {
    meal (id) {
        id -> Integer,
        meal_type -> Text,
        recipe_id -> Integer,
    }
}

// menu carries three foreign keys into meal, so it gets no joinable!
diesel::table! {
    menu (id) {
        id -> Integer,
        name -> Text,
        entree_id -> Nullable<Integer>,
        plat_id -> Nullable<Integer>,
        dessert_id -> Nullable<Integer>,
    }
}

diesel::table! {
    favorite (id) {
        id -> Integer,
        user_id -> Integer,
        recipe_id -> Integer,
    }
}

diesel::joinable!(ingredient_quantity -> recipe (recipe_id));
diesel::joinable!(ingredient_quantity -> ingredient (ingredient_id));
diesel::joinable!(meal -> recipe (recipe_id));
diesel::joinable!(favorite -> user (user_id));
diesel::joinable!(favorite -> recipe (recipe_id));

diesel::allow_tables_to_appear_in_same_query!(
    user,
    ingredient,
    recipe,
    ingredient_quantity,
    meal,
    menu,
    favorite,
);
