use actix_multipart::{Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use shared::{ChatRequest, ErrorResponse, SpeakRequest, StatusResponse};
use uuid::Uuid;

use crate::chat::{ChatError, ChatReply, ChatService, FAREWELL};
use crate::speech::SpeechError;
use crate::speech::synthesis::SynthesisService;
use crate::vision::intake::{UploadedImage, validate_upload};
use crate::vision::{PredictError, PredictionService};

const INDEX_HTML: &str = r#"
    <h1>API Server Running</h1>
    <p>Available endpoints:</p>
    <ul>
        <li>POST /api/chat - Chatbot endpoint</li>
        <li>POST /api/speak - Text-to-speech endpoint</li>
        <li>POST /api/predict - Plant disease prediction</li>
    </ul>
"#;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/api/chat").route(web::post().to(handle_chat)))
        .service(web::resource("/api/speak").route(web::post().to(handle_speak)))
        .service(web::resource("/api/predict").route(web::post().to(handle_predict)));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

async fn handle_predict(
    service: web::Data<PredictionService>,
    payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    let upload = read_upload(payload, service.upload_limit()).await?;
    let upload = validate_upload(upload).inspect_err(|e| warn!("Rejected upload: {}", e))?;

    let request_id = Uuid::new_v4();
    info!(
        "Prediction {} for {} ({} bytes)",
        request_id,
        upload.filename,
        upload.bytes.len()
    );

    let pipeline = service.get_ref().clone();
    let result = web::block(move || pipeline.predict(&upload.bytes))
        .await
        .map_err(|e| PredictError::Cancelled(e.to_string()))?;

    match result {
        Ok(prediction) => {
            info!(
                "Prediction {}: class {} ({}) at {}",
                request_id, prediction.class_index, prediction.status, prediction.confidence
            );
            Ok(HttpResponse::Ok().json(prediction))
        }
        Err(e) => {
            error!("Prediction {} failed: {}", request_id, e);
            Err(e)
        }
    }
}

/// Drains the multipart stream and keeps the first `file` field that names a file.
async fn read_upload(
    mut payload: Multipart,
    limit: usize,
) -> Result<Option<UploadedImage>, PredictError> {
    let mut upload = None;

    while let Some(mut field) = payload.try_next().await.map_err(upload_error)? {
        let (name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().map(str::to_owned),
                disposition.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(upload_error)? {
            if data.len() + chunk.len() > limit {
                return Err(PredictError::FileTooLarge);
            }
            data.extend_from_slice(&chunk);
        }

        // A part without a filename parameter is a plain form value, not a file.
        if upload.is_none() && name.as_deref() == Some("file") {
            if let Some(filename) = filename {
                upload = Some(UploadedImage {
                    filename,
                    bytes: data,
                });
            }
        }
    }

    Ok(upload)
}

/// A body that is not multipart at all carries no file part.
fn upload_error(err: MultipartError) -> PredictError {
    match err {
        MultipartError::ContentTypeMissing
        | MultipartError::ContentTypeParse
        | MultipartError::ContentTypeIncompatible => PredictError::NoFilePart,
        other => PredictError::Upload(other.to_string()),
    }
}

fn chat_error_response(err: ChatError) -> HttpResponse {
    match err {
        ChatError::EmptyInput
        | ChatError::Speech(SpeechError::Timeout)
        | ChatError::Speech(SpeechError::Unintelligible)
        | ChatError::Speech(SpeechError::Service(_)) => {
            warn!("Chat request failed: {}", err);
            HttpResponse::Ok().json(StatusResponse::error(err.to_string()))
        }
        ChatError::Speech(SpeechError::Device(_)) | ChatError::Generation(_) => {
            error!("Chat request failed: {}", err);
            internal_error(format!("An error occurred: {}", err))
        }
    }
}

fn internal_error(message: String) -> HttpResponse {
    HttpResponse::InternalServerError().json(StatusResponse::error(message))
}

async fn handle_chat(service: web::Data<ChatService>, body: web::Bytes) -> HttpResponse {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Malformed chat request: {}", e);
            return internal_error(format!("An error occurred: {}", e));
        }
    };
    info!("Chat request ({})", request.input_type);

    match service.respond(request).await {
        Ok(ChatReply::Farewell) => HttpResponse::Ok().json(StatusResponse::reply(FAREWELL, None)),
        Ok(ChatReply::Answer {
            response,
            user_input,
        }) => HttpResponse::Ok().json(StatusResponse::reply(response, Some(user_input))),
        Err(e) => chat_error_response(e),
    }
}

async fn handle_speak(service: web::Data<SynthesisService>, body: web::Bytes) -> HttpResponse {
    let request: SpeakRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Malformed speak request: {}", e);
            return internal_error(format!("Speech synthesis failed: {}", e));
        }
    };

    let text = request.text.trim();
    if text.is_empty() {
        return HttpResponse::Ok().json(StatusResponse::error("No text provided"));
    }

    match service.say(text.to_string()).await {
        Ok(()) => HttpResponse::Ok().json(StatusResponse::success()),
        Err(e) => {
            error!("Speech synthesis failed: {}", e);
            internal_error(format!("Speech synthesis failed: {}", e))
        }
    }
}
