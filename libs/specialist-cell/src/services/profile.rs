// libs/specialist-cell/src/services/profile.rs
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Specialist, SpecialistError};

pub struct SpecialistProfileService {
    supabase: SupabaseClient,
}

impl SpecialistProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Fetch a specialist profile by id.
    pub async fn get_specialist(
        &self,
        specialist_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Specialist, SpecialistError> {
        debug!("Fetching specialist: {}", specialist_id);

        let path = format!("/rest/v1/specialists?id=eq.{}", specialist_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SpecialistError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                SpecialistError::DatabaseError(format!("Failed to parse specialist: {}", e))
            }),
            None => Err(SpecialistError::NotFound),
        }
    }

    /// Resolve the specialist profile owned by an authenticated user.
    pub async fn get_specialist_for_user(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Specialist, SpecialistError> {
        debug!("Resolving specialist profile for user: {}", user_id);

        let path = format!("/rest/v1/specialists?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SpecialistError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                SpecialistError::DatabaseError(format!("Failed to parse specialist: {}", e))
            }),
            None => Err(SpecialistError::NotFound),
        }
    }

    /// Public specialist listing. The specialization filter queries the
    /// normalized text array on the specialist row with array containment.
    pub async fn list_specialists(
        &self,
        specialization: Option<String>,
        available_only: bool,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> Result<Vec<Specialist>, SpecialistError> {
        debug!("Listing specialists (specialization: {:?})", specialization);

        let mut path = "/rest/v1/specialists?order=display_name.asc".to_string();
        if let Some(spec) = specialization {
            path.push_str(&format!(
                "&specializations=cs.{{{}}}",
                urlencoding::encode(&spec)
            ));
        }
        if available_only {
            path.push_str("&is_available=eq.true&is_accepting_new_clients=eq.true");
        }
        if let Some(limit) = limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| SpecialistError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Specialist>, _>>()
            .map_err(|e| {
                SpecialistError::DatabaseError(format!("Failed to parse specialists: {}", e))
            })
    }
}
