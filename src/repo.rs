//! Repository seams between the enrollment service and storage.
//!
//! Each entity gets its own trait. A [`UnitOfWork`] bundles all of them over a
//! single transaction; nothing it writes is visible to other requests until
//! [`UnitOfWork::commit`] succeeds. Dropping a unit of work rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Course, CourseModule, Enrollment, EnrollmentStatus, EnrollmentWithCourse, Lesson,
    LessonCompletion, Notification, Payment, PaymentStatus, User,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CourseRepository: Send {
    /// Any course regardless of status.
    async fn find_course(&mut self, course_id: Uuid) -> StoreResult<Option<Course>>;

    async fn increment_student_count(&mut self, course_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait CurriculumRepository: Send {
    /// Modules of the course ordered by position.
    async fn course_modules(&mut self, course_id: Uuid) -> StoreResult<Vec<CourseModule>>;

    /// Lessons of every module of the course, ordered by module position then
    /// lesson position.
    async fn course_lessons(&mut self, course_id: Uuid) -> StoreResult<Vec<Lesson>>;
}

#[async_trait]
pub trait EnrollmentRepository: Send {
    async fn find_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;

    /// Same as [`find_enrollment`](Self::find_enrollment) but holds the row
    /// until the unit of work ends.
    async fn lock_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>>;

    /// Fails with [`StoreError::UniqueViolation`] when (user, course) already
    /// has a row.
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()>;

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<Enrollment>;

    /// Most recently updated first.
    async fn user_enrollments(
        &mut self,
        user_id: Uuid,
        status: Option<EnrollmentStatus>,
    ) -> StoreResult<Vec<EnrollmentWithCourse>>;
}

#[async_trait]
pub trait LessonCompletionRepository: Send {
    /// Inserts `candidate` unless (user, lesson) already has a row. Returns the
    /// stored row and whether it was created.
    async fn find_or_create_completion(
        &mut self,
        candidate: &LessonCompletion,
    ) -> StoreResult<(LessonCompletion, bool)>;

    async fn update_completion(
        &mut self,
        completion_id: Uuid,
        time_spent: i32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<LessonCompletion>;

    async fn completed_lesson_ids(&mut self, user_id: Uuid, course_id: Uuid)
    -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait PaymentRepository: Send {
    /// Newest matching payment.
    async fn find_payment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
        status: PaymentStatus,
    ) -> StoreResult<Option<Payment>>;

    async fn find_payment_by_id(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>>;
}

#[async_trait]
pub trait UserRepository: Send {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
}

#[async_trait]
pub trait NotificationRepository: Send {
    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()>;
}

#[async_trait]
pub trait UnitOfWork:
    CourseRepository
    + CurriculumRepository
    + EnrollmentRepository
    + LessonCompletionRepository
    + PaymentRepository
    + UserRepository
    + NotificationRepository
{
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Entry point into storage; handed to the service at construction.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}
