use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use sea_orm::ActiveValue::NotSet;

use crate::{
    entity::{
        Locations,
        locations::{ActiveModel as LocationActive, Column, Model as LocationModel},
    },
    error::AppResult,
};

/// Looks up a location by exact `(city, country)` and creates it when
/// absent. An empty country is stored as NULL.
///
/// Matching is byte-exact: "Ljubljana" and "ljubljana" are different rows.
/// There is no unique constraint behind this, so two concurrent calls for a
/// new pair can both insert.
pub async fn find_or_create<C: ConnectionTrait>(
    db: &C,
    city: &str,
    country: Option<&str>,
) -> AppResult<LocationModel> {
    let country = country.filter(|c| !c.is_empty());

    let mut query = Locations::find().filter(Column::City.eq(city));
    query = match country {
        Some(country) => query.filter(Column::Country.eq(country)),
        None => query.filter(Column::Country.is_null()),
    };

    if let Some(existing) = query.one(db).await? {
        return Ok(existing);
    }

    let created = LocationActive {
        id: NotSet,
        city: Set(city.to_string()),
        country: Set(country.map(str::to_string)),
    }
    .insert(db)
    .await?;

    tracing::debug!(location_id = created.id, city, ?country, "location created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn location(id: i32, city: &str, country: Option<&str>) -> LocationModel {
        LocationModel {
            id,
            city: city.into(),
            country: country.map(Into::into),
        }
    }

    #[tokio::test]
    async fn existing_pair_is_reused() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![location(4, "Ljubljana", Some("Slovenia"))]])
            .into_connection();

        let found = find_or_create(&db, "Ljubljana", Some("Slovenia")).await.unwrap();
        assert_eq!(found.id, 4);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn missing_pair_is_created_with_null_country() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<LocationModel>::new()])
            .append_query_results([vec![location(9, "Maribor", None)]])
            .into_connection();

        let created = find_or_create(&db, "Maribor", Some("")).await.unwrap();
        assert_eq!(created.id, 9);

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let lookup = format!("{:?}", log[0]);
        assert!(lookup.contains(r#"\"country\" IS NULL"#), "{lookup}");
        assert!(format!("{:?}", log[1]).contains("INSERT INTO"));
    }
}
