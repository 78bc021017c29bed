use crate::backend::profiles;
use crate::context::AppContext;
use crate::dto::ProfileUpdate;
use crate::entities::{Gender, Profile};
use crate::error::AppError;
use crate::utils::validation::{validate_age, validate_avatar, validate_name, validate_username};

/// Raw profile form input.
#[derive(Debug, Clone, Copy)]
pub struct ProfileForm<'a> {
    pub username: &'a str,
    pub name: &'a str,
    pub age: &'a str,
    pub gender: &'a str,
    pub avatar: &'a str,
}

impl ProfileForm<'_> {
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> Result<ProfileUpdate, AppError> {
        let gender = Gender::from_str(self.gender).ok_or_else(|| {
            AppError::Validation(
                "Gender must be male, female, other or prefer_not_to_say".to_string(),
            )
        })?;
        Ok(ProfileUpdate {
            username: Some(validate_username(self.username)?),
            name: Some(validate_name(self.name)?),
            age: Some(validate_age(self.age)?),
            gender: Some(gender),
            avatar: Some(validate_avatar(self.avatar)?),
        })
    }
}

pub struct ProfileService;

impl ProfileService {
    /// The signed-in user's profile, fresh from the backend. `None` until set up.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`] or the backend error.
    pub async fn load(ctx: &AppContext) -> Result<Option<Profile>, AppError> {
        let identity = ctx.require_identity().await?;
        match profiles::get_profile(ctx.client(), identity.user_id).await {
            Ok(profile) => {
                ctx.set_profile(profile.clone()).await?;
                Ok(Some(profile))
            }
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Validate and save the profile form.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, [`AppError::Conflict`] when the
    /// username is taken, or the backend error.
    pub async fn save(ctx: &AppContext, form: ProfileForm<'_>) -> Result<Profile, AppError> {
        let update = form.validate()?;
        let identity = ctx.require_identity().await?;
        let profile = profiles::upsert_profile(ctx.client(), identity.user_id, &update)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Conflict(format!(
                    "Username {} is already taken",
                    update.username.as_deref().unwrap_or_default()
                )),
                other => other,
            })?;
        ctx.set_profile(profile.clone()).await?;
        tracing::info!(user_id = %identity.user_id, "profile saved");
        Ok(profile)
    }
}
