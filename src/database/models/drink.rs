use serde_json::{json, Map, Value};

use crate::database::query_builder::{QueryBuilder, QueryError};
use crate::filter::ListParams;

pub const DRINK_FIELDS: &[(&str, &str)] = &[
    ("drink_ml", "drink.drink_ml"),
    ("drink_at", "drink.drink_at"),
];

pub struct DrinkModel<'a> {
    db: &'a mut QueryBuilder,
}

impl<'a> DrinkModel<'a> {
    pub fn new(db: &'a mut QueryBuilder) -> Self {
        Self { db }
    }

    /// Records a drink for the user at the store's current time.
    pub async fn drink_water(&mut self, user_id: u64, drink_ml: i64) -> Result<u64, QueryError> {
        self.db.clear();
        let mut values = Map::new();
        values.insert("id_user".into(), json!(user_id));
        values.insert("drink_ml".into(), json!(drink_ml));
        values.insert("drink_at".into(), json!("now()"));
        self.db.set(&values)?;
        self.db.from("drink")?;
        self.db.insert().await
    }

    /// The user's drinks; newest first unless the request orders otherwise.
    pub async fn history(&mut self, user_id: u64, params: &ListParams) -> Result<Vec<Map<String, Value>>, QueryError> {
        self.db.clear();
        self.db.select(["drink.id_drink AS iddrink", "drink.drink_ml", "drink.drink_at"]);
        self.db.from("drink")?;
        self.db.filter(&json!({"drink.id_user": user_id}))?;
        self.db.filter(&params.make_filter(DRINK_FIELDS))?;

        let order = params.make_order(DRINK_FIELDS);
        if order.is_empty() {
            self.db.order_by("drink.drink_at DESC");
        } else {
            self.db.order_by_fields(&order)?;
        }
        self.db.limit(params.offset, params.limit);
        self.db.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::decoder::ColumnType;
    use crate::testing::ScriptedStore;

    #[tokio::test]
    async fn drink_insert_uses_store_clock() {
        let store = ScriptedStore::new();
        store.push_affected(1, 31);
        let mut qb = QueryBuilder::new(store.boxed());

        let id = DrinkModel::new(&mut qb).drink_water(3, 250).await.unwrap();
        assert_eq!(id, 31);
        assert_eq!(
            store.statements(),
            vec!["INSERT INTO drink SET id_user = 3, drink_ml = 250, drink_at = now()"]
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_decoded() {
        let store = ScriptedStore::new();
        store.push_rows(
            &[
                ("iddrink", ColumnType::Long),
                ("drink_ml", ColumnType::Long),
                ("drink_at", ColumnType::DateTime),
            ],
            vec![vec![Some("5"), Some("300"), Some("2024-05-01 08:30:00")]],
        );
        let mut qb = QueryBuilder::new(store.boxed());

        let params = ListParams::from_pairs(vec![("drink_ml[gte]", "200")]).unwrap();
        let rows = DrinkModel::new(&mut qb).history(3, &params).await.unwrap();

        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"iddrink": 5, "drink_ml": 300, "drink_at": "2024-05-01T08:30:00"})
        );
        assert_eq!(
            store.statements(),
            vec![format!(
                "SELECT drink.id_drink AS iddrink, drink.drink_ml, drink.drink_at FROM drink \
                 WHERE drink.id_user = 3 AND drink.drink_ml >= '200' \
                 ORDER BY drink.drink_at DESC LIMIT 0,{}",
                params.limit
            )]
        );
    }
}
