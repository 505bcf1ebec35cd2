use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{RegistrationDraft, RegistrationFields},
    repo::Projection,
    repo_types::{NewUser, Role, User},
};
use crate::{
    auth::AccessSubject,
    error::{AppError, StoreError},
    state::AppState,
    uploads::StagedFile,
};

pub const EMAIL_TAKEN: &str = "User with this email already exists";
pub const ATTACHMENTS_REQUIRED: &str = "Profile image and CV are required";
pub const UPLOAD_FAILED: &str = "Failed to upload files";
pub const CREATE_FAILED: &str = "Failed to create user";

/// Everything a registration request carries once the multipart body has
/// been read and its files staged on disk.
#[derive(Debug, Default)]
pub struct RegistrationIntake {
    pub fields: RegistrationFields,
    pub profile_image: Option<StagedFile>,
    pub cv: Option<StagedFile>,
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registered {
    /// Re-read without secrets.
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Registers a user in one pass: presence check, uniqueness, full field
/// validation, require attachments, upload, hash, persist, issue tokens,
/// re-read sanitized.
/// Any failure short-circuits; nothing is retried.
#[instrument(skip_all, fields(role = %intake.fields.role.trim()))]
pub async fn register_user(st: &AppState, intake: RegistrationIntake) -> Result<Registered, AppError> {
    let RegistrationIntake {
        fields,
        profile_image,
        cv,
    } = intake;

    let email = fields.required_email().map_err(|e| {
        warn!(error = %e, "registration rejected");
        e
    })?;

    match st.users.find_by_email(&email).await {
        Ok(None) => {}
        Ok(Some(_)) => {
            warn!(%email, "email already registered");
            return Err(AppError::Conflict(EMAIL_TAKEN.into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::internal(CREATE_FAILED));
        }
    }

    let draft = fields.into_draft().map_err(|e| {
        warn!(error = %e, "registration rejected");
        e
    })?;

    let (profile_image, cv) = require_attachments(st, &draft, profile_image, cv)?;

    ensure_subjects_exist(st, draft.role.subject_refs()).await?;

    let (profile_image_url, cv_url) = upload_attachments(st, &profile_image, cv.as_ref()).await?;

    let codec = st.passwords.clone();
    let plain = draft.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || codec.hash(&plain))
        .await
        .map_err(|e| {
            error!(error = %e, "hashing task failed");
            AppError::internal(CREATE_FAILED)
        })?
        .map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::internal(CREATE_FAILED)
        })?;

    let RegistrationDraft {
        email,
        fullname,
        phone,
        date_of_birth,
        gender,
        role,
        ..
    } = draft;
    let enrollment = role
        .into_enrollment(cv_url.clone())
        .map_err(AppError::Validation)?;

    let new_user = NewUser {
        email,
        password_hash,
        fullname,
        phone,
        date_of_birth,
        gender,
        profile_image: Some(profile_image_url.clone()),
        enrollment,
    };

    let user = st.users.create(new_user).await.map_err(|e| {
        warn!(
            profile_image = %profile_image_url,
            cv = ?cv_url,
            "uploaded assets orphaned by failed insert"
        );
        store_error(e)
    })?;

    let (access_token, refresh_token) = issue_tokens(st, &user).await?;

    let created = st
        .users
        .find_by_id(user.id, Projection::Public)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "re-read of created user failed");
            AppError::internal(CREATE_FAILED)
        })?
        .ok_or_else(|| {
            error!(user_id = %user.id, "created user not found on re-read");
            AppError::internal(CREATE_FAILED)
        })?;

    info!(user_id = %created.id, role = %created.role, "user registered");
    Ok(Registered {
        user: created.sanitized(),
        access_token,
        refresh_token,
    })
}

fn require_attachments(
    st: &AppState,
    draft: &RegistrationDraft,
    profile_image: Option<StagedFile>,
    cv: Option<StagedFile>,
) -> Result<(StagedFile, Option<StagedFile>), AppError> {
    if st.config.registration.require_cv_for_all_roles {
        return match (profile_image, cv) {
            (Some(image), Some(cv)) => Ok((image, Some(cv))),
            _ => Err(AppError::validation(ATTACHMENTS_REQUIRED)),
        };
    }

    let image = profile_image.ok_or_else(|| AppError::validation("Profile image is required"))?;
    if draft.role.role() == Role::Teacher && cv.is_none() {
        return Err(AppError::validation("CV is required for teachers"));
    }
    Ok((image, cv))
}

async fn ensure_subjects_exist(st: &AppState, refs: &[Uuid]) -> Result<(), AppError> {
    if refs.is_empty() {
        return Ok(());
    }
    let found = st.subjects.find_active_ids(refs).await.map_err(|e| {
        error!(error = %e, "subject lookup failed");
        AppError::internal(CREATE_FAILED)
    })?;
    match refs.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(AppError::validation(format!(
            "Unknown or inactive subject: {missing}"
        ))),
        None => Ok(()),
    }
}

/// Uploads both attachments concurrently. Staged files are consumed by the
/// gateway on every outcome.
async fn upload_attachments(
    st: &AppState,
    profile_image: &StagedFile,
    cv: Option<&StagedFile>,
) -> Result<(String, Option<String>), AppError> {
    let image_upload = st.uploads.upload(profile_image.path(), Some("profile-images"));
    let cv_upload = async {
        match cv {
            Some(file) => st.uploads.upload(file.path(), Some("cvs")).await.map(Some),
            None => Ok(None),
        }
    };

    match tokio::join!(image_upload, cv_upload) {
        (Ok(image), Ok(cv)) => Ok((image, cv)),
        (image, cv) => {
            if let Ok(url) = &image {
                warn!(%url, "profile image orphaned by failed cv upload");
            }
            if let Ok(Some(url)) = &cv {
                warn!(%url, "cv orphaned by failed profile image upload");
            }
            Err(AppError::Upload(UPLOAD_FAILED.into()))
        }
    }
}

async fn issue_tokens(st: &AppState, user: &User) -> Result<(String, String), AppError> {
    let access_token = st
        .tokens
        .issue_access_token(&AccessSubject::from(user))
        .map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            AppError::internal(CREATE_FAILED)
        })?;
    let refresh_token = st.tokens.issue_refresh_token(user.id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        AppError::internal(CREATE_FAILED)
    })?;

    st.users
        .set_refresh_token(user.id, &refresh_token)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "store refresh token failed");
            AppError::internal(CREATE_FAILED)
        })?;

    Ok((access_token, refresh_token))
}

fn store_error(e: StoreError) -> AppError {
    match e {
        StoreError::Duplicate(field) => {
            warn!(field, "duplicate key on insert");
            AppError::Conflict(EMAIL_TAKEN.into())
        }
        StoreError::Validation(msg) => {
            warn!(%msg, "store rejected user");
            AppError::Validation(msg)
        }
        other => {
            error!(error = %other, "create user failed");
            AppError::internal(CREATE_FAILED)
        }
    }
}
