// src/db.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{
    Course, CourseModule, Enrollment, EnrollmentStatus, EnrollmentWithCourse, Lesson,
    LessonCompletion, Notification, Payment, PaymentStatus, User,
};
use crate::repo::{
    CourseRepository, CurriculumRepository, EnrollmentRepository, LessonCompletionRepository,
    NotificationRepository, PaymentRepository, Store, StoreResult, UnitOfWork, UserRepository,
};

const COURSE_COLUMNS: &str = "id, instructor_id, title, thumbnail, level, duration, rating, status, \
     is_deleted, price, original_price, discount, student_count";

const ENROLLMENT_COLUMNS: &str = "id, user_id, course_id, status, progress, enrollment_type, \
     payment_id, start_date, completion_date, created_at, updated_at";

const COMPLETION_COLUMNS: &str = "id, user_id, course_id, lesson_id, time_spent, completed_at";

const PAYMENT_COLUMNS: &str =
    "id, user_id, course_id, amount, payment_method, payment_status, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CourseRepository for PgUnitOfWork {
    async fn find_course(&mut self, course_id: Uuid) -> StoreResult<Option<Course>> {
        let course =
            sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
                .bind(course_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(course)
    }

    async fn increment_student_count(&mut self, course_id: Uuid) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE courses SET student_count = student_count + 1 WHERE id = $1")
                .bind(course_id)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing("course"));
        }
        Ok(())
    }
}

#[async_trait]
impl CurriculumRepository for PgUnitOfWork {
    async fn course_modules(&mut self, course_id: Uuid) -> StoreResult<Vec<CourseModule>> {
        let modules = sqlx::query_as::<_, CourseModule>(
            "SELECT id, course_id, title, position FROM course_modules WHERE course_id = $1 ORDER BY position, id",
        )
        .bind(course_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(modules)
    }

    async fn course_lessons(&mut self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        let lessons = sqlx::query_as::<_, Lesson>(
            "SELECT l.id, l.module_id, l.title, l.lesson_type, l.duration, l.position \
             FROM course_lessons l JOIN course_modules m ON m.id = l.module_id \
             WHERE m.course_id = $1 ORDER BY m.position, m.id, l.position, l.id",
        )
        .bind(course_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(lessons)
    }
}

#[async_trait]
impl EnrollmentRepository for PgUnitOfWork {
    async fn find_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments WHERE user_id = $1 AND course_id = $2"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(enrollment)
    }

    async fn lock_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments \
             WHERE user_id = $1 AND course_id = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(enrollment)
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO course_enrollments ({ENROLLMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(enrollment.id)
        .bind(enrollment.user_id)
        .bind(enrollment.course_id)
        .bind(enrollment.status)
        .bind(enrollment.progress)
        .bind(enrollment.enrollment_type)
        .bind(enrollment.payment_id)
        .bind(enrollment.start_date)
        .bind(enrollment.completion_date)
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::from_insert)?;
        Ok(())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<Enrollment> {
        let updated = sqlx::query_as::<_, Enrollment>(&format!(
            "UPDATE course_enrollments \
             SET status = $2, progress = $3, completion_date = $4, updated_at = $5 \
             WHERE id = $1 RETURNING {ENROLLMENT_COLUMNS}"
        ))
        .bind(enrollment.id)
        .bind(enrollment.status)
        .bind(enrollment.progress)
        .bind(enrollment.completion_date)
        .bind(enrollment.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        updated.ok_or(StoreError::Missing("enrollment"))
    }

    async fn user_enrollments(
        &mut self,
        user_id: Uuid,
        status: Option<EnrollmentStatus>,
    ) -> StoreResult<Vec<EnrollmentWithCourse>> {
        let enrollments = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments \
             WHERE user_id = $1 AND ($2::enrollment_status IS NULL OR status = $2) \
             ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&mut *self.tx)
        .await?;

        let course_ids: Vec<Uuid> = enrollments.iter().map(|e| e.course_id).collect();
        let courses: HashMap<Uuid, Course> = sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ANY($1)"
        ))
        .bind(&course_ids[..])
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

        // Enrollments whose course row vanished are left out of the listing.
        Ok(enrollments
            .into_iter()
            .filter_map(|enrollment| {
                let course = courses.get(&enrollment.course_id)?.summary();
                Some(EnrollmentWithCourse { enrollment, course })
            })
            .collect())
    }
}

#[async_trait]
impl LessonCompletionRepository for PgUnitOfWork {
    async fn find_or_create_completion(
        &mut self,
        candidate: &LessonCompletion,
    ) -> StoreResult<(LessonCompletion, bool)> {
        let inserted = sqlx::query_as::<_, LessonCompletion>(&format!(
            "INSERT INTO course_lesson_completions ({COMPLETION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, lesson_id) DO NOTHING RETURNING {COMPLETION_COLUMNS}"
        ))
        .bind(candidate.id)
        .bind(candidate.user_id)
        .bind(candidate.course_id)
        .bind(candidate.lesson_id)
        .bind(candidate.time_spent)
        .bind(candidate.completed_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        let existing = sqlx::query_as::<_, LessonCompletion>(&format!(
            "SELECT {COMPLETION_COLUMNS} FROM course_lesson_completions \
             WHERE user_id = $1 AND lesson_id = $2"
        ))
        .bind(candidate.user_id)
        .bind(candidate.lesson_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok((existing, false))
    }

    async fn update_completion(
        &mut self,
        completion_id: Uuid,
        time_spent: i32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<LessonCompletion> {
        let updated = sqlx::query_as::<_, LessonCompletion>(&format!(
            "UPDATE course_lesson_completions SET time_spent = $2, completed_at = $3 \
             WHERE id = $1 RETURNING {COMPLETION_COLUMNS}"
        ))
        .bind(completion_id)
        .bind(time_spent)
        .bind(completed_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        updated.ok_or(StoreError::Missing("lesson completion"))
    }

    async fn completed_lesson_ids(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT lesson_id FROM course_lesson_completions \
             WHERE user_id = $1 AND course_id = $2 ORDER BY completed_at, id",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl PaymentRepository for PgUnitOfWork {
    async fn find_payment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
        status: PaymentStatus,
    ) -> StoreResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM course_payments \
             WHERE user_id = $1 AND course_id = $2 AND payment_status = $3 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(course_id)
        .bind(status)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payment)
    }

    async fn find_payment_by_id(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM course_payments WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payment)
    }
}

#[async_trait]
impl UserRepository for PgUnitOfWork {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, name, email, password_hash, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::from_insert)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgUnitOfWork {
    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        sqlx::query("INSERT INTO notifications (id, user_id, kind, title, message, data, is_read, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(notification.id)
            .bind(notification.user_id)
            .bind(&notification.kind)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.data)
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}
