use crate::{errors::ApiError, state::AppState, uploads::UploadStore};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode, header},
};
use inference::InferenceBackend;
use posts::{NewPost, Post};

pub async fn list_posts<B>(State(state): State<AppState<B>>) -> Result<Json<Vec<Post>>, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    Ok(Json(state.posts.list().await?))
}

pub async fn get_post<B>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let not_found = || ApiError::not_found("Post not found");
    let id: u64 = id.parse().map_err(|_| not_found())?;

    state.posts.get(id).await?.map(Json).ok_or_else(not_found)
}

/// Photo part of a multipart submission.
struct PhotoUpload {
    filename: String,
    bytes: Bytes,
}

struct Submission {
    fields: NewPost,
    /// `Some` whenever a `photo` file part was sent, even with an empty name
    photo: Option<PhotoUpload>,
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut fields = NewPost::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(filename) = field.file_name().map(str::to_string) {
            if name == "photo" && photo.is_none() {
                let bytes = field.bytes().await?;
                photo = Some(PhotoUpload { filename, bytes });
            }
            continue;
        }

        let slot = match name.as_str() {
            "title" => &mut fields.title,
            "description" => &mut fields.description,
            "location" => &mut fields.location,
            "phone" => &mut fields.phone,
            "photo_url" => &mut fields.photo_url,
            _ => continue,
        };
        set_once(slot, field.text().await?);
    }

    Ok(Submission { fields, photo })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Accepts multipart forms and JSON bodies. Anything else, or a JSON body that
/// does not parse, is treated as an empty submission.
#[tracing::instrument(skip_all)]
pub async fn create_post<B>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    request: Request,
) -> Result<(StatusCode, Json<Post>), ApiError>
where
    B: InferenceBackend + Send + 'static,
{
    let submission = if is_multipart(&headers) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
        let fields = if is_json(&headers) {
            serde_json::from_slice(&body).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Ignoring unreadable JSON body");
                NewPost::default()
            })
        } else {
            NewPost::default()
        };
        Submission {
            fields,
            photo: None,
        }
    };

    // A named photo part replaces any photo_url field
    if let Some(photo) = &submission.photo
        && !photo.filename.is_empty()
    {
        UploadStore::check(&photo.filename)?;
    }

    let mut valid = submission.fields.validate()?;

    if let Some(photo) = submission.photo {
        valid.photo_url = if photo.filename.is_empty() {
            None
        } else {
            Some(state.uploads.save(&photo.filename, &photo.bytes).await?)
        };
    }

    let with_photo = valid.photo_url.is_some();
    let post = state.posts.insert(valid).await?;
    state.metrics.record_post_created(with_photo);

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let origin = format!("http://{}", host);

    Ok((StatusCode::CREATED, Json(post.with_absolute_photo_url(&origin))))
}
