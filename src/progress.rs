//! Course progress computed from lesson completion records.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CourseModule, Lesson, LessonType};

/// Module/lesson tree of one course. Both lists are kept in display order:
/// modules by position, lessons by module position then lesson position.
#[derive(Clone, Debug, Default)]
pub struct Curriculum {
    modules: Vec<CourseModule>,
    lessons: Vec<Lesson>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextLesson {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    pub module: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub progress_percentage: i32,
    pub total_duration: i64,
    pub completed_duration: i64,
    pub next_lesson: Option<NextLesson>,
}

impl CourseProgress {
    pub fn is_complete(&self) -> bool {
        self.progress_percentage == 100
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    pub duration: Option<i32>,
    pub position: i32,
    pub completed: bool,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub lessons: Vec<LessonProgress>,
    pub completed_lessons: usize,
    pub total_lessons: usize,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CourseStructure {
    pub modules: Vec<ModuleProgress>,
    pub total_modules: usize,
    pub total_lessons: usize,
    pub completed_lessons: usize,
}

/// Rounded share of `completed` in `total`, half up. Only a fully completed
/// course reaches 100; 0 when the course has no lessons.
pub fn percentage(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    let rounded = (completed * 200 + total) / (2 * total);
    if completed < total {
        rounded.min(99) as i32
    } else {
        100
    }
}

impl Curriculum {
    pub fn new(modules: Vec<CourseModule>, lessons: Vec<Lesson>) -> Self {
        Self { modules, lessons }
    }

    pub fn contains_lesson(&self, lesson_id: Uuid) -> bool {
        self.lessons.iter().any(|l| l.id == lesson_id)
    }

    fn module_title(&self, module_id: Uuid) -> Option<String> {
        self.modules
            .iter()
            .find(|m| m.id == module_id)
            .map(|m| m.title.clone())
    }

    /// Progress of a learner whose completion rows name `completed_lesson_ids`.
    /// Ids of lessons outside this curriculum are ignored.
    pub fn progress(&self, completed_lesson_ids: &[Uuid]) -> CourseProgress {
        let completed: HashSet<Uuid> = completed_lesson_ids.iter().copied().collect();

        let mut completed_lessons = 0;
        let mut total_duration = 0i64;
        let mut completed_duration = 0i64;
        let mut next_lesson = None;

        for lesson in &self.lessons {
            let duration = i64::from(lesson.duration.unwrap_or(0));
            total_duration += duration;
            if completed.contains(&lesson.id) {
                completed_lessons += 1;
                completed_duration += duration;
            } else if next_lesson.is_none() {
                next_lesson = Some(NextLesson {
                    id: lesson.id,
                    title: lesson.title.clone(),
                    lesson_type: lesson.lesson_type,
                    module: self.module_title(lesson.module_id),
                });
            }
        }

        let total_lessons = self.lessons.len();
        CourseProgress {
            completed_lessons,
            total_lessons,
            progress_percentage: percentage(completed_lessons, total_lessons),
            total_duration,
            completed_duration,
            next_lesson,
        }
    }

    /// The module/lesson tree with each lesson flagged as completed or not.
    pub fn structure(&self, completed_lesson_ids: &[Uuid]) -> CourseStructure {
        let completed: HashSet<Uuid> = completed_lesson_ids.iter().copied().collect();

        let modules: Vec<ModuleProgress> = self
            .modules
            .iter()
            .map(|module| {
                let lessons: Vec<LessonProgress> = self
                    .lessons
                    .iter()
                    .filter(|l| l.module_id == module.id)
                    .map(|l| LessonProgress {
                        id: l.id,
                        title: l.title.clone(),
                        lesson_type: l.lesson_type,
                        duration: l.duration,
                        position: l.position,
                        completed: completed.contains(&l.id),
                    })
                    .collect();
                ModuleProgress {
                    id: module.id,
                    title: module.title.clone(),
                    position: module.position,
                    completed_lessons: lessons.iter().filter(|l| l.completed).count(),
                    total_lessons: lessons.len(),
                    lessons,
                }
            })
            .collect();

        CourseStructure {
            total_modules: modules.len(),
            total_lessons: modules.iter().map(|m| m.total_lessons).sum(),
            completed_lessons: modules.iter().map(|m| m.completed_lessons).sum(),
            modules,
        }
    }
}
