//! In-process [`Store`] used by tests and local demos.
//!
//! A unit of work takes the store lock for its whole lifetime and edits a
//! private copy of the tables; commit swaps the copy in. Units of work are
//! therefore fully serialized, which is stronger than what Postgres gives.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Course, CourseModule, Enrollment, EnrollmentStatus, EnrollmentWithCourse, Lesson,
    LessonCompletion, Notification, Payment, PaymentStatus, User,
};
use crate::repo::{
    CourseRepository, CurriculumRepository, EnrollmentRepository, LessonCompletionRepository,
    NotificationRepository, PaymentRepository, Store, StoreResult, UnitOfWork, UserRepository,
};

#[derive(Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    courses: HashMap<Uuid, Course>,
    modules: Vec<CourseModule>,
    lessons: Vec<Lesson>,
    payments: Vec<Payment>,
    enrollments: Vec<Enrollment>,
    completions: Vec<LessonCompletion>,
    notifications: Vec<Notification>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_course(&self, course: Course) {
        self.tables.lock().await.courses.insert(course.id, course);
    }

    pub async fn insert_module(&self, module: CourseModule) {
        self.tables.lock().await.modules.push(module);
    }

    pub async fn insert_lesson(&self, lesson: Lesson) {
        self.tables.lock().await.lessons.push(lesson);
    }

    pub async fn remove_lesson(&self, lesson_id: Uuid) {
        self.tables.lock().await.lessons.retain(|l| l.id != lesson_id);
    }

    pub async fn insert_payment(&self, payment: Payment) {
        self.tables.lock().await.payments.push(payment);
    }

    /// Writes a completion row directly, bypassing the enrollment flow.
    pub async fn insert_completion(&self, completion: LessonCompletion) {
        self.tables.lock().await.completions.push(completion);
    }

    pub async fn course(&self, course_id: Uuid) -> Option<Course> {
        self.tables.lock().await.courses.get(&course_id).cloned()
    }

    pub async fn enrollments(&self) -> Vec<Enrollment> {
        self.tables.lock().await.enrollments.clone()
    }

    pub async fn completions(&self) -> Vec<LessonCompletion> {
        self.tables.lock().await.completions.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.lock().await.notifications.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl CourseRepository for MemoryUnitOfWork {
    async fn find_course(&mut self, course_id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.working.courses.get(&course_id).cloned())
    }

    async fn increment_student_count(&mut self, course_id: Uuid) -> StoreResult<()> {
        let course = self
            .working
            .courses
            .get_mut(&course_id)
            .ok_or(StoreError::Missing("course"))?;
        course.student_count += 1;
        Ok(())
    }
}

#[async_trait]
impl CurriculumRepository for MemoryUnitOfWork {
    async fn course_modules(&mut self, course_id: Uuid) -> StoreResult<Vec<CourseModule>> {
        let mut modules: Vec<CourseModule> = self
            .working
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| (m.position, m.id));
        Ok(modules)
    }

    async fn course_lessons(&mut self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        let modules = self.course_modules(course_id).await?;
        let mut lessons = Vec::new();
        for module in &modules {
            let mut module_lessons: Vec<Lesson> = self
                .working
                .lessons
                .iter()
                .filter(|l| l.module_id == module.id)
                .cloned()
                .collect();
            module_lessons.sort_by_key(|l| (l.position, l.id));
            lessons.extend(module_lessons);
        }
        Ok(lessons)
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryUnitOfWork {
    async fn find_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .working
            .enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn lock_enrollment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<Enrollment>> {
        // The unit of work already holds the store lock.
        self.find_enrollment(user_id, course_id).await
    }

    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<()> {
        let duplicate = self
            .working
            .enrollments
            .iter()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "course_enrollments_user_id_course_id_key".to_string(),
            ));
        }
        self.working.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> StoreResult<Enrollment> {
        let stored = self
            .working
            .enrollments
            .iter_mut()
            .find(|e| e.id == enrollment.id)
            .ok_or(StoreError::Missing("enrollment"))?;
        stored.status = enrollment.status;
        stored.progress = enrollment.progress;
        stored.completion_date = enrollment.completion_date;
        stored.updated_at = enrollment.updated_at;
        Ok(stored.clone())
    }

    async fn user_enrollments(
        &mut self,
        user_id: Uuid,
        status: Option<EnrollmentStatus>,
    ) -> StoreResult<Vec<EnrollmentWithCourse>> {
        let mut rows: Vec<EnrollmentWithCourse> = self
            .working
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id && status.is_none_or(|s| e.status == s))
            .filter_map(|e| {
                let course = self.working.courses.get(&e.course_id)?.summary();
                Some(EnrollmentWithCourse {
                    enrollment: e.clone(),
                    course,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.enrollment.updated_at.cmp(&a.enrollment.updated_at));
        Ok(rows)
    }
}

#[async_trait]
impl LessonCompletionRepository for MemoryUnitOfWork {
    async fn find_or_create_completion(
        &mut self,
        candidate: &LessonCompletion,
    ) -> StoreResult<(LessonCompletion, bool)> {
        let existing = self
            .working
            .completions
            .iter()
            .find(|c| c.user_id == candidate.user_id && c.lesson_id == candidate.lesson_id);
        if let Some(existing) = existing {
            return Ok((existing.clone(), false));
        }
        self.working.completions.push(candidate.clone());
        Ok((candidate.clone(), true))
    }

    async fn update_completion(
        &mut self,
        completion_id: Uuid,
        time_spent: i32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<LessonCompletion> {
        let stored = self
            .working
            .completions
            .iter_mut()
            .find(|c| c.id == completion_id)
            .ok_or(StoreError::Missing("lesson completion"))?;
        stored.time_spent = time_spent;
        stored.completed_at = completed_at;
        Ok(stored.clone())
    }

    async fn completed_lesson_ids(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .working
            .completions
            .iter()
            .filter(|c| c.user_id == user_id && c.course_id == course_id)
            .map(|c| c.lesson_id)
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryUnitOfWork {
    async fn find_payment(
        &mut self,
        user_id: Uuid,
        course_id: Uuid,
        status: PaymentStatus,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .filter(|p| p.payment_status == status)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_payment_by_id(&mut self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .cloned())
    }
}

#[async_trait]
impl UserRepository for MemoryUnitOfWork {
    async fn find_user(&mut self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryUnitOfWork {
    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        self.working.notifications.push(notification.clone());
        Ok(())
    }
}
