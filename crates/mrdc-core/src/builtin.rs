//! Built-in definitions of the six retail tables.

use crate::catalog::{ColumnDef, ColumnType, KeyFormat, Rule, TableDefinition};

pub const DIM_USERS: &str = "dim_users";
pub const DIM_CARD_DETAILS: &str = "dim_card_details";
pub const DIM_STORE_DETAILS: &str = "dim_store_details";
pub const DIM_PRODUCTS: &str = "dim_products";
pub const DIM_DATE_TIMES: &str = "dim_date_times";
pub const ORDERS_TABLE: &str = "orders_table";

pub fn tables() -> Vec<TableDefinition> {
    vec![
        dim_users(),
        dim_card_details(),
        dim_store_details(),
        dim_products(),
        dim_date_times(),
        orders_table(),
    ]
}

fn date(name: &str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Date).rule(Rule::Date)
}

fn uuid(name: &str) -> ColumnDef {
    ColumnDef::text(name).rule(Rule::Uuid)
}

fn remap(pairs: &[(&str, &str)]) -> Rule {
    Rule::Remap {
        map: pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
    }
}

fn card_number(name: &str) -> ColumnDef {
    ColumnDef::text(name).rule(Rule::StripPunctuation)
}

pub fn dim_users() -> TableDefinition {
    TableDefinition::new(DIM_USERS, "user_uuid", KeyFormat::Uuid)
        .column(ColumnDef::text("first_name"))
        .column(ColumnDef::text("last_name"))
        .column(date("date_of_birth"))
        .column(ColumnDef::text("company"))
        .column(ColumnDef::text("email_address"))
        .column(ColumnDef::text("address"))
        .column(ColumnDef::text("country"))
        .column(
            ColumnDef::text("country_code")
                .rule(Rule::Upper)
                .rule(remap(&[("GGB", "GB")])),
        )
        .column(ColumnDef::text("phone_number"))
        .column(date("join_date"))
        .column(uuid("user_uuid"))
}

pub fn dim_card_details() -> TableDefinition {
    TableDefinition::new(DIM_CARD_DETAILS, "card_number", KeyFormat::Digits)
        .column(card_number("card_number"))
        .column(ColumnDef::text("expiry_date"))
        .column(ColumnDef::text("card_provider"))
        .column(date("date_payment_confirmed"))
}

pub fn dim_store_details() -> TableDefinition {
    TableDefinition::new(
        DIM_STORE_DETAILS,
        "store_code",
        KeyFormat::Pattern {
            pattern: "^[A-Z]{2,3}-[0-9A-Z]+$".to_string(),
        },
    )
    .column(ColumnDef::text("store_code"))
    .column(ColumnDef::text("address"))
    .column(ColumnDef::new("longitude", ColumnType::Float64).rule(Rule::Float))
    .column(ColumnDef::new("latitude", ColumnType::Float64).rule(Rule::Float))
    .column(ColumnDef::text("locality"))
    .column(ColumnDef::new("staff_numbers", ColumnType::Int64).rule(Rule::Int))
    .column(date("opening_date"))
    .column(ColumnDef::text("store_type"))
    .column(
        ColumnDef::text("country_code")
            .rule(Rule::Upper)
            .rule(Rule::OneOf {
                values: vec!["GB".into(), "DE".into(), "US".into()],
            }),
    )
    .column(ColumnDef::text("continent").rule(remap(&[
        ("eeEurope", "Europe"),
        ("eeAmerica", "America"),
    ])))
}

pub fn dim_products() -> TableDefinition {
    TableDefinition::new(
        DIM_PRODUCTS,
        "product_code",
        KeyFormat::Pattern {
            pattern: "^[A-Za-z0-9]+-[A-Za-z0-9]+$".to_string(),
        },
    )
    .column(ColumnDef::text("product_name"))
    .column(ColumnDef::new("product_price", ColumnType::Float64).rule(Rule::Float))
    .column(ColumnDef::new("weight", ColumnType::Float64).rule(Rule::WeightGrams))
    .column(
        ColumnDef::text("weight_class")
            .derived_from("weight")
            .rule(Rule::WeightClass),
    )
    .column(ColumnDef::text("category"))
    .column(ColumnDef::text("ean").source("EAN").rule(Rule::Digits))
    .column(date("date_added"))
    .column(uuid("uuid"))
    .column(
        ColumnDef::new("still_available", ColumnType::Boolean)
            .source("removed")
            .rule(Rule::BoolMap {
                true_tokens: vec!["Still_available".into(), "Still_avaliable".into()],
                false_tokens: vec!["Removed".into()],
            }),
    )
    .column(ColumnDef::text("product_code"))
}

pub fn dim_date_times() -> TableDefinition {
    TableDefinition::new(DIM_DATE_TIMES, "date_uuid", KeyFormat::Uuid)
        .column(ColumnDef::new("timestamp", ColumnType::Time).rule(Rule::Time))
        .column(ColumnDef::new("month", ColumnType::Int64).rule(Rule::Int))
        .column(ColumnDef::new("year", ColumnType::Int64).rule(Rule::Int))
        .column(ColumnDef::new("day", ColumnType::Int64).rule(Rule::Int))
        .column(ColumnDef::text("time_period"))
        .column(uuid("date_uuid"))
}

/// The fact table; its foreign keys are audited at load time only
pub fn orders_table() -> TableDefinition {
    TableDefinition::new(ORDERS_TABLE, "order_index", KeyFormat::NonNegative)
        .column(
            ColumnDef::new("order_index", ColumnType::Int64)
                .source("index")
                .rule(Rule::Int),
        )
        .column(uuid("date_uuid"))
        .column(uuid("user_uuid"))
        .column(card_number("card_number").rule(Rule::Digits))
        .column(ColumnDef::text("store_code"))
        .column(ColumnDef::text("product_code"))
        .column(ColumnDef::new("product_quantity", ColumnType::Int64).rule(Rule::Int))
        .foreign_key("date_uuid", DIM_DATE_TIMES)
        .foreign_key("user_uuid", DIM_USERS)
        .foreign_key("card_number", DIM_CARD_DETAILS)
        .foreign_key("store_code", DIM_STORE_DETAILS)
        .foreign_key("product_code", DIM_PRODUCTS)
}
