use serde::{Deserialize, Serialize};

/// Column names follow the MySQL `world` sample schema.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    #[sqlx(rename = "Username")]
    pub username: String,
    #[sqlx(rename = "HashedPass")]
    pub hashed_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct City {
    #[sqlx(rename = "ID")]
    pub id: i32,
    #[sqlx(rename = "Name")]
    pub name: String,
    #[sqlx(rename = "CountryCode")]
    pub country_code: String,
    #[sqlx(rename = "District")]
    pub district: String,
    #[sqlx(rename = "Population")]
    pub population: i32,
}

/// Body of a city insert. Accepts both the JSON field names and the
/// database column names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCity {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "CountryCode")]
    pub country_code: String,
    #[serde(alias = "District")]
    pub district: String,
    #[serde(alias = "Population")]
    pub population: i32,
}

impl NewCity {
    pub fn into_city(self, id: i32) -> City {
        City {
            id,
            name: self.name,
            country_code: self.country_code,
            district: self.district,
            population: self.population,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Country {
    #[sqlx(rename = "Code")]
    pub code: String,
    #[sqlx(rename = "Name")]
    pub name: String,
    #[sqlx(rename = "Continent")]
    pub continent: String,
    #[sqlx(rename = "Region")]
    pub region: String,
    #[sqlx(rename = "SurfaceArea")]
    #[serde(rename = "surfacearea")]
    pub surface_area: f32,
    #[sqlx(rename = "IndepYear")]
    #[serde(rename = "indepyear")]
    pub independence_year: Option<i16>,
    #[sqlx(rename = "Population")]
    pub population: i32,
    #[sqlx(rename = "LifeExpectancy")]
    #[serde(rename = "lifeexpectancy")]
    pub life_expectancy: Option<f32>,
    #[sqlx(rename = "GNP")]
    pub gnp: Option<f32>,
    #[sqlx(rename = "GNPOld")]
    #[serde(rename = "gnpold")]
    pub gnp_old: Option<f32>,
    #[sqlx(rename = "LocalName")]
    #[serde(rename = "localname")]
    pub local_name: String,
    #[sqlx(rename = "GovernmentForm")]
    #[serde(rename = "governmentform")]
    pub government_form: String,
    #[sqlx(rename = "HeadOfState")]
    #[serde(rename = "headofstate")]
    pub head_of_state: Option<String>,
    #[sqlx(rename = "Capital")]
    pub capital: Option<i32>,
    #[sqlx(rename = "Code2")]
    pub code2: String,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{City, Country, NewCity};

    #[test]
    fn city_serializes_with_camel_case_fields() {
        let city = City {
            id: 1,
            name: String::from("Kabul"),
            country_code: String::from("AFG"),
            district: String::from("Kabol"),
            population: 1_780_000,
        };
        let value = serde_json::to_value(&city).ok();
        assert_eq!(
            value,
            Some(json!({
                "id": 1,
                "name": "Kabul",
                "countryCode": "AFG",
                "district": "Kabol",
                "population": 1_780_000
            }))
        );
    }

    #[test]
    fn new_city_accepts_column_names() {
        let parsed: Result<NewCity, _> = serde_json::from_value(json!({
            "Name": "Tokyo",
            "CountryCode": "JPN",
            "District": "Tokyo",
            "Population": 9_000_000
        }));
        let city = parsed.ok().map(|c| c.into_city(7));
        assert_eq!(city.map(|c| (c.id, c.country_code)), Some((7, String::from("JPN"))));
    }

    #[test]
    fn country_serializes_missing_optionals_as_null() {
        let country = Country {
            code: String::from("ATA"),
            name: String::from("Antarctica"),
            continent: String::from("Antarctica"),
            region: String::from("Antarctica"),
            surface_area: 13_120_000.0,
            independence_year: None,
            population: 0,
            life_expectancy: None,
            gnp: Some(0.0),
            gnp_old: None,
            local_name: String::from("–"),
            government_form: String::from("Co-administrated"),
            head_of_state: None,
            capital: None,
            code2: String::from("AQ"),
        };
        let value = serde_json::to_value(&country).unwrap_or(Value::Null);
        assert_eq!(value["indepyear"], Value::Null);
        assert_eq!(value["headofstate"], Value::Null);
        assert_eq!(value["capital"], Value::Null);
        assert_eq!(value["code2"], json!("AQ"));
        assert_eq!(value["governmentform"], json!("Co-administrated"));
    }
}
