use webfilter_engine::{Inspect, View};

use super::CourseKey;

#[derive(Debug, Clone, PartialEq)]
pub struct CourseUserGroup {
    pub id: i64,
    pub name: String,
    pub course_id: CourseKey,
    pub group_type: String,
}

impl Inspect for CourseUserGroup {
    fn view(&self) -> View<'_> {
        View::Fields(vec![
            ("id", &self.id as &dyn Inspect),
            ("name", &self.name),
            ("course_id", &self.course_id),
            ("group_type", &self.group_type),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortMembership {
    pub id: i64,
    pub user_id: i64,
    pub course_id: CourseKey,
    pub course_user_group: CourseUserGroup,
}

impl Inspect for CohortMembership {
    fn view(&self) -> View<'_> {
        View::Fields(vec![
            ("id", &self.id as &dyn Inspect),
            ("user_id", &self.user_id),
            ("course_id", &self.course_id),
            ("course_user_group", &self.course_user_group),
        ])
    }
}

/// A learner moving from one cohort to another.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortChange {
    pub current_membership: CohortMembership,
    pub target_cohort: CourseUserGroup,
}
