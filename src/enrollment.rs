//! Enrollment lifecycle and lesson completion.
//!
//! An enrollment moves `not-started → in-progress → completed`. The state
//! before any row exists is [`EnrollmentState::Unenrolled`]. Progress is only
//! ever written from a recomputation over the learner's completion rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{
    Course, CourseSummary, Enrollment, EnrollmentStatus, EnrollmentType, EnrollmentWithCourse,
    LessonCompletion, Payment, PaymentStatus,
};
use crate::notify::{EnrollmentNotice, Notifier};
use crate::progress::{CourseProgress, CourseStructure, Curriculum};
use crate::repo::{
    CourseRepository, CurriculumRepository, EnrollmentRepository, LessonCompletionRepository,
    PaymentRepository, Store, StoreResult, UnitOfWork,
};

const RECENT_ACTIVITY_DAYS: i64 = 7;
const NEXT_STEPS: usize = 3;

/// Price information returned instead of an enrollment for paid courses.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub course_id: Uuid,
    pub course_title: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub discount: Option<i32>,
}

/// An outstanding payment that blocks a second enrollment attempt.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub course_id: Uuid,
    pub course_title: String,
    pub payment_id: Uuid,
    pub payment_method: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            payment_method: payment.payment_method.clone(),
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentState {
    Unenrolled,
    Enrolled(Enrollment),
}

impl From<Option<Enrollment>> for EnrollmentState {
    fn from(row: Option<Enrollment>) -> Self {
        match row {
            Some(enrollment) => EnrollmentState::Enrolled(enrollment),
            None => EnrollmentState::Unenrolled,
        }
    }
}

impl EnrollmentState {
    pub fn is_enrolled(&self) -> bool {
        matches!(self, EnrollmentState::Enrolled(_))
    }

    pub fn into_option(self) -> Option<Enrollment> {
        match self {
            EnrollmentState::Enrolled(enrollment) => Some(enrollment),
            EnrollmentState::Unenrolled => None,
        }
    }

    /// The enrollment, or `NotEnrolled` carrying `message`.
    pub fn require(self, message: &str) -> AppResult<Enrollment> {
        self.into_option()
            .ok_or_else(|| AppError::NotEnrolled(message.to_string()))
    }
}

impl Enrollment {
    pub fn start(
        user_id: Uuid,
        course_id: Uuid,
        enrollment_type: EnrollmentType,
        payment_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            status: EnrollmentStatus::NotStarted,
            progress: 0,
            enrollment_type,
            payment_id,
            start_date: now,
            completion_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the enrollment forward after a lesson completion. The completion
    /// date is stamped the first time the course reaches 100 and kept after.
    pub fn apply_progress(&mut self, progress: &CourseProgress, now: DateTime<Utc>) {
        if self.status == EnrollmentStatus::NotStarted {
            self.status = EnrollmentStatus::InProgress;
        }
        self.progress = progress.progress_percentage;
        if progress.is_complete() {
            self.status = EnrollmentStatus::Completed;
            if self.completion_date.is_none() {
                self.completion_date = Some(now);
            }
        }
        self.updated_at = now;
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCheck {
    pub is_enrolled: bool,
    pub enrollment: Option<Enrollment>,
    pub has_pending_payment: bool,
    pub pending_payment: Option<PaymentSummary>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressView {
    pub enrollment: Enrollment,
    pub progress: CourseProgress,
    pub structure: CourseStructure,
    pub completed_lesson_ids: Vec<Uuid>,
}

#[derive(Serialize, Clone, Debug)]
pub struct LessonCompletionOutcome {
    pub completion: LessonCompletion,
    pub enrollment: Enrollment,
    pub progress: CourseProgress,
    #[serde(skip)]
    pub created: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress_courses: usize,
    pub average_progress: i32,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub course_id: Uuid,
    pub course_title: String,
    pub progress: i32,
    pub status: EnrollmentStatus,
    pub last_activity: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub course_id: Uuid,
    pub course_title: String,
    pub progress: i32,
    pub thumbnail: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEnrollment {
    pub id: Uuid,
    pub course: CourseSummary,
    pub progress: i32,
    pub status: EnrollmentStatus,
    pub start_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LearningDashboard {
    pub summary: DashboardSummary,
    pub recent_activity: Vec<RecentActivity>,
    pub next_steps: Vec<NextStep>,
    pub enrollments: Vec<DashboardEnrollment>,
}

#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<dyn Store>,
    notifier: Notifier,
    curricula: Cache<Uuid, Arc<Curriculum>>,
}

impl EnrollmentService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, curriculum_ttl: Duration) -> Self {
        let curricula = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(curriculum_ttl)
            .build();
        Self {
            store,
            notifier,
            curricula,
        }
    }

    /// Cached tree for read-only views. May lag behind edits by up to the TTL.
    async fn curriculum(
        &self,
        uow: &mut dyn UnitOfWork,
        course_id: Uuid,
    ) -> StoreResult<Arc<Curriculum>> {
        if let Some(cached) = self.curricula.get(&course_id).await {
            return Ok(cached);
        }
        self.load_curriculum(uow, course_id).await
    }

    /// Reads the tree through `uow` and replaces the cached copy. Writes that
    /// derive progress from the tree must use this one.
    async fn load_curriculum(
        &self,
        uow: &mut dyn UnitOfWork,
        course_id: Uuid,
    ) -> StoreResult<Arc<Curriculum>> {
        let modules = uow.course_modules(course_id).await?;
        let lessons = uow.course_lessons(course_id).await?;
        let curriculum = Arc::new(Curriculum::new(modules, lessons));
        self.curricula.insert(course_id, curriculum.clone()).await;
        Ok(curriculum)
    }

    /// Inserts a fresh enrollment and bumps the course's student count. A lost
    /// race against a concurrent enroll reports the winner's row.
    async fn create_enrollment(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        course: &Course,
        enrollment: Enrollment,
    ) -> AppResult<Enrollment> {
        match uow.insert_enrollment(&enrollment).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                drop(uow);
                let mut uow = self.store.begin().await?;
                let existing = uow
                    .find_enrollment(enrollment.user_id, course.id)
                    .await?
                    .ok_or(StoreError::Missing("enrollment"))?;
                return Err(AppError::AlreadyEnrolled(Box::new(existing)));
            }
            Err(e) => return Err(e.into()),
        }
        uow.increment_student_count(course.id).await?;
        uow.commit().await?;

        tracing::info!(
            "User {} enrolled in course {} ({})",
            enrollment.user_id,
            course.id,
            enrollment.enrollment_type.as_str()
        );
        self.notifier.notify(EnrollmentNotice {
            instructor_id: course.instructor_id,
            course_id: course.id,
            course_title: course.title.clone(),
            student_id: enrollment.user_id,
            enrollment_type: enrollment.enrollment_type,
        });
        Ok(enrollment)
    }

    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> AppResult<Enrollment> {
        let mut uow = self.store.begin().await?;

        let course = uow
            .find_course(course_id)
            .await?
            .filter(Course::is_available)
            .ok_or_else(|| AppError::NotFound("Course not found or not available".to_string()))?;

        if let EnrollmentState::Enrolled(existing) =
            EnrollmentState::from(uow.find_enrollment(user_id, course_id).await?)
        {
            return Err(AppError::AlreadyEnrolled(Box::new(existing)));
        }

        let price = course.effective_price();
        if price > 0 {
            if let Some(pending) = uow
                .find_payment(user_id, course_id, PaymentStatus::Pending)
                .await?
            {
                return Err(AppError::PaymentPending(PendingPayment {
                    course_id: course.id,
                    course_title: course.title.clone(),
                    payment_id: pending.id,
                    payment_method: pending.payment_method,
                    amount: pending.amount,
                    created_at: pending.created_at,
                }));
            }
            return Err(AppError::PaymentRequired(PaymentQuote {
                course_id: course.id,
                course_title: course.title.clone(),
                price,
                original_price: course.original_price,
                discount: course.discount,
            }));
        }

        let enrollment = Enrollment::start(user_id, course_id, EnrollmentType::Free, None, Utc::now());
        self.create_enrollment(uow, &course, enrollment).await
    }

    /// Called by the payment-confirmation flow once `payment_id` is confirmed.
    pub async fn activate_paid_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Uuid,
    ) -> AppResult<Enrollment> {
        let mut uow = self.store.begin().await?;

        let payment = uow
            .find_payment_by_id(payment_id)
            .await?
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
        if payment.payment_status != PaymentStatus::Completed {
            return Err(AppError::Validation(
                "Payment has not been confirmed".to_string(),
            ));
        }

        let course = uow
            .find_course(course_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        if let EnrollmentState::Enrolled(existing) =
            EnrollmentState::from(uow.find_enrollment(user_id, course_id).await?)
        {
            return Err(AppError::AlreadyEnrolled(Box::new(existing)));
        }

        let enrollment = Enrollment::start(
            user_id,
            course_id,
            EnrollmentType::Paid,
            Some(payment.id),
            Utc::now(),
        );
        self.create_enrollment(uow, &course, enrollment).await
    }

    pub async fn check_enrollment(&self, user_id: Uuid, course_id: Uuid) -> AppResult<EnrollmentCheck> {
        let mut uow = self.store.begin().await?;
        let state = EnrollmentState::from(uow.find_enrollment(user_id, course_id).await?);
        let pending = uow
            .find_payment(user_id, course_id, PaymentStatus::Pending)
            .await?;

        Ok(EnrollmentCheck {
            is_enrolled: state.is_enrolled(),
            enrollment: state.into_option(),
            has_pending_payment: pending.is_some(),
            pending_payment: pending.as_ref().map(PaymentSummary::from),
        })
    }

    pub async fn my_enrollments(
        &self,
        user_id: Uuid,
        status: Option<EnrollmentStatus>,
    ) -> AppResult<Vec<EnrollmentWithCourse>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.user_enrollments(user_id, status).await?)
    }

    pub async fn calculate_course_progress(
        &self,
        course_id: Uuid,
        completed_lesson_ids: &[Uuid],
    ) -> AppResult<CourseProgress> {
        let mut uow = self.store.begin().await?;
        let curriculum = self.curriculum(uow.as_mut(), course_id).await?;
        Ok(curriculum.progress(completed_lesson_ids))
    }

    pub async fn course_structure_with_progress(
        &self,
        course_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<CourseStructure> {
        let mut uow = self.store.begin().await?;
        let completed = uow.completed_lesson_ids(user_id, course_id).await?;
        let curriculum = self.curriculum(uow.as_mut(), course_id).await?;
        Ok(curriculum.structure(&completed))
    }

    pub async fn course_progress(&self, user_id: Uuid, course_id: Uuid) -> AppResult<CourseProgressView> {
        let mut uow = self.store.begin().await?;
        let enrollment = EnrollmentState::from(uow.find_enrollment(user_id, course_id).await?)
            .require("You are not enrolled in this course")?;

        let completed_lesson_ids = uow.completed_lesson_ids(user_id, course_id).await?;
        let curriculum = self.curriculum(uow.as_mut(), course_id).await?;

        Ok(CourseProgressView {
            enrollment,
            progress: curriculum.progress(&completed_lesson_ids),
            structure: curriculum.structure(&completed_lesson_ids),
            completed_lesson_ids,
        })
    }

    pub async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        lesson_id: Uuid,
        time_spent: i32,
    ) -> AppResult<LessonCompletionOutcome> {
        if time_spent < 0 {
            return Err(AppError::Validation(
                "timeSpent must not be negative".to_string(),
            ));
        }
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let mut enrollment = EnrollmentState::from(uow.lock_enrollment(user_id, course_id).await?)
            .require("You must be enrolled in this course to complete lessons")?;

        let curriculum = self.load_curriculum(uow.as_mut(), course_id).await?;
        if !curriculum.contains_lesson(lesson_id) {
            return Err(AppError::NotFound(
                "Lesson not found in this course".to_string(),
            ));
        }

        let candidate = LessonCompletion {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            lesson_id,
            time_spent,
            completed_at: now,
        };
        let (mut completion, created) = uow.find_or_create_completion(&candidate).await?;
        if !created {
            completion = uow.update_completion(completion.id, time_spent, now).await?;
        }

        let completed_lesson_ids = uow.completed_lesson_ids(user_id, course_id).await?;
        let progress = curriculum.progress(&completed_lesson_ids);

        let previous = enrollment.progress;
        enrollment.apply_progress(&progress, now);
        let enrollment = uow.update_enrollment(&enrollment).await?;
        uow.commit().await?;

        tracing::debug!(
            "User {} progress in course {}: {}% -> {}% ({}/{})",
            user_id,
            course_id,
            previous,
            enrollment.progress,
            progress.completed_lessons,
            progress.total_lessons
        );
        if progress.is_complete() && previous < 100 {
            tracing::info!("User {} completed course {}", user_id, course_id);
        }

        Ok(LessonCompletionOutcome {
            completion,
            enrollment,
            progress,
            created,
        })
    }

    pub async fn learning_dashboard(&self, user_id: Uuid) -> AppResult<LearningDashboard> {
        let rows = self.my_enrollments(user_id, None).await?;
        Ok(build_dashboard(rows, Utc::now()))
    }
}

fn build_dashboard(rows: Vec<EnrollmentWithCourse>, now: DateTime<Utc>) -> LearningDashboard {
    let total_courses = rows.len();
    let count = |status| rows.iter().filter(|r| r.enrollment.status == status).count();
    let average_progress = if total_courses > 0 {
        let sum: i64 = rows.iter().map(|r| i64::from(r.enrollment.progress)).sum();
        (sum as f64 / total_courses as f64).round() as i32
    } else {
        0
    };
    let summary = DashboardSummary {
        total_courses,
        completed_courses: count(EnrollmentStatus::Completed),
        in_progress_courses: count(EnrollmentStatus::InProgress),
        average_progress,
    };

    let cutoff = now - chrono::Duration::days(RECENT_ACTIVITY_DAYS);
    let recent_activity = rows
        .iter()
        .filter(|r| r.enrollment.updated_at > cutoff)
        .map(|r| RecentActivity {
            course_id: r.course.id,
            course_title: r.course.title.clone(),
            progress: r.enrollment.progress,
            status: r.enrollment.status,
            last_activity: r.enrollment.updated_at,
        })
        .collect();

    let next_steps = rows
        .iter()
        .filter(|r| r.enrollment.status == EnrollmentStatus::InProgress)
        .take(NEXT_STEPS)
        .map(|r| NextStep {
            course_id: r.course.id,
            course_title: r.course.title.clone(),
            progress: r.enrollment.progress,
            thumbnail: r.course.thumbnail.clone(),
        })
        .collect();

    let enrollments = rows
        .into_iter()
        .map(|r| DashboardEnrollment {
            id: r.enrollment.id,
            course: r.course,
            progress: r.enrollment.progress,
            status: r.enrollment.status,
            start_date: r.enrollment.start_date,
            completion_date: r.enrollment.completion_date,
        })
        .collect();

    LearningDashboard {
        summary,
        recent_activity,
        next_steps,
        enrollments,
    }
}
