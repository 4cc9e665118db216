// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "course_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub title: String,
    pub thumbnail: Option<String>,
    pub level: String,
    pub duration: Option<i32>,
    pub rating: f64,
    pub status: CourseStatus,
    pub is_deleted: bool,
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    /// Percentage shown next to the price; informational only.
    pub discount: Option<i32>,
    pub student_count: i32,
}

impl Course {
    /// Whether learners may see and enroll in the course.
    pub fn is_available(&self) -> bool {
        self.status == CourseStatus::Published && !self.is_deleted
    }

    /// The price a learner has to pay. A zero `price` falls back to
    /// `original_price`; negative amounts count as free.
    pub fn effective_price(&self) -> i64 {
        let price = match self.price {
            Some(p) if p != 0 => p,
            _ => self.original_price.unwrap_or(0),
        };
        price.max(0)
    }

    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            id: self.id,
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            level: self.level.clone(),
            duration: self.duration,
            rating: self.rating,
            students: self.student_count,
        }
    }
}

/// Course fields embedded into enrollment listings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub thumbnail: Option<String>,
    pub level: String,
    pub duration: Option<i32>,
    pub rating: f64,
    pub students: i32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EnrollmentStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "enrollment_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentType {
    Free,
    Paid,
}

impl EnrollmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentType::Free => "free",
            EnrollmentType::Paid => "paid",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub progress: i32,
    pub enrollment_type: EnrollmentType,
    pub payment_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: CourseSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, FromRow)]
pub struct LessonCompletion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    /// Seconds.
    pub time_spent: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    /// Confirmed by the payment processor.
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "lesson_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Document,
    Video,
    Exercise,
    Quiz,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub lesson_type: LessonType,
    /// Minutes.
    pub duration: Option<i32>,
    pub position: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Default)]
pub struct CompleteLessonRequest {
    #[serde(rename = "timeSpent", default)]
    pub time_spent: i32,
}

#[derive(Deserialize)]
pub struct EnrollmentQuery {
    pub status: Option<EnrollmentStatus>,
}
