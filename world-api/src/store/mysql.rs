use async_trait::async_trait;
use sqlx::MySqlPool;

use super::{City, Country, NewCity, StoreError, User, WorldStore};

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorldStore for MySqlStore {
    async fn count_users(&self, username: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE Username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_user(&self, username: &str, hashed_password: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (Username, HashedPass) VALUES (?, ?)")
            .bind(username)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT Username, HashedPass FROM users WHERE Username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_city_by_name(&self, name: &str) -> Result<Option<City>, StoreError> {
        let city = sqlx::query_as::<_, City>(
            r"
            SELECT ID, Name, CountryCode, District, Population
            FROM city
            WHERE Name = ?
            ORDER BY ID
            LIMIT 1
            ",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(city)
    }

    async fn list_countries(&self) -> Result<Vec<Country>, StoreError> {
        let countries = sqlx::query_as::<_, Country>(
            r"
            SELECT Code, Name, Continent, Region, SurfaceArea, IndepYear, Population,
                   LifeExpectancy, GNP, GNPOld, LocalName, GovernmentForm, HeadOfState,
                   Capital, Code2
            FROM country
            ORDER BY Code
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(countries)
    }

    async fn insert_city(&self, city: &NewCity) -> Result<City, StoreError> {
        let result = sqlx::query(
            "INSERT INTO city (Name, CountryCode, District, Population) VALUES (?, ?, ?, ?)",
        )
        .bind(&city.name)
        .bind(&city.country_code)
        .bind(&city.district)
        .bind(city.population)
        .execute(&self.pool)
        .await?;

        let id = i32::try_from(result.last_insert_id())
            .map_err(|err| StoreError::Database(sqlx::Error::Decode(Box::new(err))))?;
        Ok(city.clone().into_city(id))
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Database(err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::{is_unique_violation, map_insert_error};
    use crate::store::StoreError;

    #[derive(Debug)]
    struct TestDbError {
        unique: bool,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23000"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.unique {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::Other
            }
        }
    }

    fn db_error(unique: bool) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { unique }))
    }

    #[test]
    fn duplicate_key_is_a_unique_violation() {
        assert!(is_unique_violation(&db_error(true)));
        assert!(!is_unique_violation(&db_error(false)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn insert_maps_duplicate_to_conflict() {
        assert!(matches!(
            map_insert_error(db_error(true)),
            StoreError::Conflict
        ));
        assert!(matches!(
            map_insert_error(sqlx::Error::PoolTimedOut),
            StoreError::Database(_)
        ));
    }
}
