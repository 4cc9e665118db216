// src/courses.rs
use actix_web::{HttpResponse, get, post, web};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::enrollment::EnrollmentService;
use crate::error::AppError;
use crate::models::{CompleteLessonRequest, EnrollmentQuery};

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
    cfg.service(enroll_course);
    cfg.service(my_enrollments);
    cfg.service(check_enrollment);
    cfg.service(course_progress);
    cfg.service(complete_lesson);
    cfg.service(learning_dashboard);
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

#[post("/courses/{course_id}/enroll")]
pub async fn enroll_course(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let enrollment = service.enroll(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Successfully enrolled in course",
        "data": enrollment,
    })))
}

/// Enrollments of the caller across all courses, newest activity first.
/// Served outside `/courses/{course_id}` because the listing is not scoped
/// to one course; `?status=` narrows it.
#[get("/enrollments/mine")]
pub async fn my_enrollments(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
    query: web::Query<EnrollmentQuery>,
) -> Result<HttpResponse, AppError> {
    let enrollments = service.my_enrollments(user.0, query.status).await?;
    Ok(HttpResponse::Ok().json(json!({ "data": enrollments })))
}

#[get("/courses/{course_id}/enrollment/check")]
pub async fn check_enrollment(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let check = service.check_enrollment(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "data": check })))
}

#[get("/courses/{course_id}/progress")]
pub async fn course_progress(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = service.course_progress(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "data": view })))
}

#[post("/courses/{course_id}/lessons/{lesson_id}/complete")]
pub async fn complete_lesson(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (course_id, lesson_id) = path.into_inner();
    // An empty body means no time was tracked.
    let request: CompleteLessonRequest = if body.is_empty() {
        CompleteLessonRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?
    };
    let time_spent = request.time_spent;

    let outcome = service
        .complete_lesson(user.0, course_id, lesson_id, time_spent)
        .await?;
    let message = if outcome.created {
        "Lesson marked as complete"
    } else {
        "Lesson completion updated"
    };
    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "data": outcome,
    })))
}

#[get("/learning/dashboard")]
pub async fn learning_dashboard(
    service: web::Data<EnrollmentService>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let dashboard = service.learning_dashboard(user.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "data": dashboard })))
}
