//! HTTP tests for the enrollment and progress endpoints, backed by the
//! in-memory store.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, http::StatusCode, test, web};
use chrono::Utc;
use course_progress::auth::{self, issue_token};
use course_progress::config::Config;
use course_progress::courses;
use course_progress::enrollment::EnrollmentService;
use course_progress::memory::MemoryStore;
use course_progress::models::{
    Course, CourseModule, CourseStatus, Lesson, LessonType, Payment, PaymentStatus, User,
};
use course_progress::notify::{NotificationWorker, Notifier};
use course_progress::repo::Store;
use serde_json::{Value, json};
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct Ctx {
    store: MemoryStore,
    service: EnrollmentService,
    config: Config,
    student: Uuid,
    instructor: Uuid,
    token: String,
}

async fn ctx() -> Ctx {
    let store = MemoryStore::new();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let (notifier, rx) = Notifier::channel(16);
    NotificationWorker::new(shared.clone(), None).spawn(rx);
    let service = EnrollmentService::new(shared, notifier, Duration::from_secs(60));

    let student = Uuid::new_v4();
    let instructor = Uuid::new_v4();
    for (id, name) in [(student, "Minh"), (instructor, "Teacher")] {
        store
            .insert_user(User {
                id,
                name: name.to_string(),
                email: format!("{id}@example.com"),
                password_hash: String::new(),
                created_at: Utc::now(),
            })
            .await;
    }

    Ctx {
        token: issue_token(SECRET, student).unwrap(),
        store,
        service,
        config: Config::for_tests(SECRET),
        student,
        instructor,
    }
}

impl Ctx {
    fn bearer(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token))
    }

    async fn course(&self, price: Option<i64>) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: self.instructor,
            title: "SQL Basics".to_string(),
            thumbnail: Some("sql.png".to_string()),
            level: "Beginner".to_string(),
            duration: Some(120),
            rating: 4.5,
            status: CourseStatus::Published,
            is_deleted: false,
            price,
            original_price: None,
            discount: Some(20),
            student_count: 0,
        };
        self.store.insert_course(course.clone()).await;
        course
    }

    async fn lessons(&self, course_id: Uuid, count: i32) -> Vec<Uuid> {
        let module = CourseModule {
            id: Uuid::new_v4(),
            course_id,
            title: "Queries".to_string(),
            position: 1,
        };
        self.store.insert_module(module.clone()).await;
        let mut ids = Vec::new();
        for position in 1..=count {
            let lesson = Lesson {
                id: Uuid::new_v4(),
                module_id: module.id,
                title: format!("Query {position}"),
                lesson_type: LessonType::Exercise,
                duration: Some(10),
                position,
            };
            ids.push(lesson.id);
            self.store.insert_lesson(lesson).await;
        }
        ids
    }
}

macro_rules! init_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from(
                    Arc::new($ctx.store.clone()) as Arc<dyn Store>
                ))
                .app_data(web::Data::new($ctx.service.clone()))
                .app_data(web::Data::new($ctx.config.clone()))
                .configure(auth::init_routes)
                .configure(courses::init_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn health_needs_no_token() {
    let ctx = ctx().await;
    let app = init_app!(ctx);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn protected_routes_reject_missing_or_bad_tokens() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .insert_header(("Authorization", "Bearer not-a-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    assert!(ctx.store.enrollments().await.is_empty());
}

#[actix_web::test]
async fn free_enrollment_is_created_once() {
    let ctx = ctx().await;
    let course = ctx.course(Some(0)).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["enrollment_type"], "free");
    assert_eq!(body["data"]["status"], "not-started");
    assert_eq!(body["data"]["progress"], 0);
    let first_id = body["data"]["id"].clone();

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["id"], first_id);

    assert_eq!(ctx.store.enrollments().await.len(), 1);
    assert_eq!(ctx.store.course(course.id).await.unwrap().student_count, 1);

    // Instructor notification is written by the background worker.
    let mut notifications = Vec::new();
    for _ in 0..50 {
        notifications = ctx.store.notifications().await;
        if !notifications.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, ctx.instructor);
}

#[actix_web::test]
async fn paid_course_requires_payment() {
    let ctx = ctx().await;
    let course = ctx.course(Some(200_000)).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["requiresPayment"], true);
    assert_eq!(body["data"]["price"], 200_000);
    assert_eq!(body["data"]["discount"], 20);

    assert!(ctx.store.enrollments().await.is_empty());
    assert_eq!(ctx.store.course(course.id).await.unwrap().student_count, 0);
}

#[actix_web::test]
async fn pending_payment_is_reported() {
    let ctx = ctx().await;
    let course = ctx.course(Some(200_000)).await;
    let payment = Payment {
        id: Uuid::new_v4(),
        user_id: ctx.student,
        course_id: course.id,
        amount: 200_000,
        payment_method: "momo".to_string(),
        payment_status: PaymentStatus::Pending,
        created_at: Utc::now(),
    };
    ctx.store.insert_payment(payment.clone()).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["isPending"], true);
    assert_eq!(body["data"]["paymentId"], payment.id.to_string());
    assert_eq!(body["data"]["paymentMethod"], "momo");

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{}/enrollment/check", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["isEnrolled"], false);
    assert_eq!(body["data"]["enrollment"], Value::Null);
    assert_eq!(body["data"]["hasPendingPayment"], true);
    assert_eq!(body["data"]["pendingPayment"]["id"], payment.id.to_string());
}

#[actix_web::test]
async fn unknown_course_is_not_found() {
    let ctx = ctx().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/enroll", Uuid::new_v4()))
        .insert_header(ctx.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn completing_lessons_drives_progress_to_completion() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let lessons = ctx.lessons(course.id, 2).await;
    ctx.service.enroll(ctx.student, course.id).await.unwrap();
    let app = init_app!(ctx);

    let complete = |lesson: Uuid, time_spent: i32| {
        test::TestRequest::post()
            .uri(&format!("/courses/{}/lessons/{}/complete", course.id, lesson))
            .insert_header(ctx.bearer())
            .set_json(json!({ "timeSpent": time_spent }))
            .to_request()
    };

    let resp = test::call_service(&app, complete(lessons[0], 30)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Lesson marked as complete");
    assert_eq!(body["data"]["progress"]["progressPercentage"], 50);
    assert_eq!(body["data"]["enrollment"]["status"], "in-progress");
    assert_eq!(body["data"]["completion"]["time_spent"], 30);

    let body: Value =
        test::read_body_json(test::call_service(&app, complete(lessons[1], 45)).await).await;
    assert_eq!(body["data"]["enrollment"]["progress"], 100);
    assert_eq!(body["data"]["enrollment"]["status"], "completed");
    let completion_date = body["data"]["enrollment"]["completion_date"].clone();
    assert!(completion_date.is_string());

    let body: Value =
        test::read_body_json(test::call_service(&app, complete(lessons[1], 80)).await).await;
    assert_eq!(body["message"], "Lesson completion updated");
    assert_eq!(body["data"]["completion"]["time_spent"], 80);
    assert_eq!(body["data"]["enrollment"]["progress"], 100);
    assert_eq!(body["data"]["enrollment"]["completion_date"], completion_date);
    assert_eq!(ctx.store.completions().await.len(), 2);
}

#[actix_web::test]
async fn completion_without_body_defaults_time_spent() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let lessons = ctx.lessons(course.id, 1).await;
    ctx.service.enroll(ctx.student, course.id).await.unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/lessons/{}/complete", course.id, lessons[0]))
        .insert_header(ctx.bearer())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["completion"]["time_spent"], 0);
    assert_eq!(body["data"]["enrollment"]["status"], "completed");
}

#[actix_web::test]
async fn completion_errors_map_to_status_codes() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let lessons = ctx.lessons(course.id, 1).await;
    let app = init_app!(ctx);

    let uri = format!("/courses/{}/lessons/{}/complete", course.id, lessons[0]);
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(ctx.bearer())
        .set_json(json!({ "timeSpent": 5 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    ctx.service.enroll(ctx.student, course.id).await.unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/courses/{}/lessons/{}/complete", course.id, Uuid::new_v4()))
        .insert_header(ctx.bearer())
        .set_json(json!({ "timeSpent": 5 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(ctx.bearer())
        .insert_header(("Content-Type", "application/json"))
        .set_payload(r#"{"timeSpent": "a while"}"#)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    assert!(ctx.store.completions().await.is_empty());
}

#[actix_web::test]
async fn progress_endpoint_returns_structure() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let lessons = ctx.lessons(course.id, 2).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{}/progress", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    ctx.service.enroll(ctx.student, course.id).await.unwrap();
    ctx.service
        .complete_lesson(ctx.student, course.id, lessons[1], 12)
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/courses/{}/progress", course.id))
        .insert_header(ctx.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let data = &body["data"];
    assert_eq!(data["progress"]["completedLessons"], 1);
    assert_eq!(data["progress"]["totalLessons"], 2);
    assert_eq!(data["progress"]["nextLesson"]["id"], lessons[0].to_string());
    assert_eq!(data["completedLessonIds"], json!([lessons[1].to_string()]));
    assert_eq!(data["structure"]["modules"][0]["lessons"][1]["completed"], true);
    assert_eq!(data["structure"]["modules"][0]["lessons"][0]["completed"], false);
    assert_eq!(data["enrollment"]["progress"], 50);
}

#[actix_web::test]
async fn my_enrollments_embed_course_and_filter_by_status() {
    let ctx = ctx().await;
    let first = ctx.course(None).await;
    let lessons = ctx.lessons(first.id, 2).await;
    let second = ctx.course(None).await;
    ctx.service.enroll(ctx.student, first.id).await.unwrap();
    ctx.service.enroll(ctx.student, second.id).await.unwrap();
    ctx.service
        .complete_lesson(ctx.student, first.id, lessons[0], 3)
        .await
        .unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/enrollments/mine")
        .insert_header(ctx.bearer())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["course"]["id"], first.id.to_string());
    assert_eq!(rows[0]["course"]["students"], 1);

    let req = test::TestRequest::get()
        .uri("/enrollments/mine?status=not-started")
        .insert_header(ctx.bearer())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["course_id"], second.id.to_string());

    let req = test::TestRequest::get()
        .uri("/enrollments/mine?status=paused")
        .insert_header(ctx.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn dashboard_lists_next_steps() {
    let ctx = ctx().await;
    let course = ctx.course(None).await;
    let lessons = ctx.lessons(course.id, 4).await;
    ctx.service.enroll(ctx.student, course.id).await.unwrap();
    ctx.service
        .complete_lesson(ctx.student, course.id, lessons[0], 3)
        .await
        .unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/learning/dashboard")
        .insert_header(ctx.bearer())
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["summary"]["totalCourses"], 1);
    assert_eq!(body["data"]["summary"]["inProgressCourses"], 1);
    assert_eq!(body["data"]["summary"]["averageProgress"], 25);
    assert_eq!(body["data"]["nextSteps"][0]["courseId"], course.id.to_string());
    assert_eq!(body["data"]["nextSteps"][0]["thumbnail"], "sql.png");
}

#[actix_web::test]
async fn register_then_login_issues_a_usable_token() {
    let ctx = ctx().await;
    let app = init_app!(ctx);

    let register = || {
        test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "name": "Hoa",
                "email": "hoa@example.com",
                "password": "hunter22",
            }))
            .to_request()
    };
    let resp = test::call_service(&app, register()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(test::call_service(&app, register()).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "hoa@example.com", "password": "wrong-pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "hoa@example.com", "password": "hunter22" }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/enrollments/mine")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"], json!([]));
}

#[actix_web::test]
async fn register_validates_input() {
    let ctx = ctx().await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({ "name": "Hoa", "email": "hoa@example.com", "password": "123" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}
