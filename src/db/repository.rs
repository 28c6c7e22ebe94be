use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

use crate::models::{
    BatchSchedule, Course, EnrollmentRecord, Highlight, Module, NewBatchSchedule, NewCourse,
    NewEnrollment, NewOverview, Overview, Topic,
};
use crate::slug::slugify;

const COURSE_COLUMNS: &str = "id, title, slug, description, image, students_enrolled, duration, level, rating, modules_count, curriculum_file, file_uploaded_at";

const BATCH_COLUMNS: &str = "id, course_id, batch_number, title, subtitle, start_date, start_day, time_slot, duration, is_active, created_at, updated_at";

const ENROLLMENT_COLUMNS: &str = "id, email, course_id, student_name, phone, extra_info, is_verified, verification_token, verified_at, created_at";

/// Active batch joined with the course it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct CourseBatchRow {
    pub course_title: String,
    pub course_slug: String,
    #[sqlx(flatten)]
    pub batch: BatchSchedule,
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY id"))
        .fetch_all(db)
        .await
}

pub async fn find_course_by_slug<'e, E>(db: E, slug: &str) -> Result<Option<Course>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE slug = ?"))
        .bind(slug)
        .fetch_optional(db)
        .await
}

/// Inserts a course. A missing slug becomes `{slugify(title)}-{unix_ts}`.
pub async fn insert_course<'e, E>(db: E, req: NewCourse) -> Result<Course, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let slug = match req.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => format!("{}-{}", slugify(&req.title), Utc::now().timestamp()),
    };

    sqlx::query_as::<_, Course>(&format!(
        r#"
        INSERT INTO courses
            (title, slug, description, image, students_enrolled, duration, level, rating, modules_count)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING {COURSE_COLUMNS}
        "#
    ))
    .bind(&req.title)
    .bind(&slug)
    .bind(&req.description)
    .bind(&req.image)
    .bind(req.students_enrolled)
    .bind(&req.duration)
    .bind(&req.level)
    .bind(req.rating)
    .bind(req.modules_count)
    .fetch_one(db)
    .await
}

/// Points a course at a stored curriculum file, or clears it with `None`.
pub async fn set_curriculum_file(
    db: &SqlitePool,
    course_id: i64,
    file: Option<&str>,
    uploaded_at: Option<DateTime<Utc>>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE courses SET curriculum_file = ?1, file_uploaded_at = ?2 WHERE id = ?3",
    )
    .bind(file)
    .bind(file.and(uploaded_at))
    .bind(course_id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn fetch_overview(db: &SqlitePool, course_id: i64) -> Result<Option<Overview>, sqlx::Error> {
    sqlx::query_as::<_, Overview>(
        r#"
        SELECT course_id, average_package, average_hike, transitions,
               salary_min, salary_avg, salary_max, priority_percentage
        FROM overviews
        WHERE course_id = ?
        "#,
    )
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn insert_overview<'e, E>(
    db: E,
    course_id: i64,
    overview: &NewOverview,
) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO overviews
            (course_id, average_package, average_hike, transitions,
             salary_min, salary_avg, salary_max, priority_percentage)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(course_id)
    .bind(&overview.average_package)
    .bind(&overview.average_hike)
    .bind(&overview.transitions)
    .bind(&overview.salary_min)
    .bind(&overview.salary_avg)
    .bind(&overview.salary_max)
    .bind(&overview.priority_percentage)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn fetch_highlights(db: &SqlitePool, course_id: i64) -> Result<Vec<Highlight>, sqlx::Error> {
    sqlx::query_as::<_, Highlight>(
        "SELECT id, course_id, point, is_bullet FROM highlights WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn insert_highlight<'e, E>(
    db: E,
    course_id: i64,
    point: &str,
    is_bullet: bool,
) -> Result<Highlight, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Highlight>(
        r#"
        INSERT INTO highlights (course_id, point, is_bullet)
        VALUES (?1, ?2, ?3)
        RETURNING id, course_id, point, is_bullet
        "#,
    )
    .bind(course_id)
    .bind(point)
    .bind(is_bullet)
    .fetch_one(db)
    .await
}

pub async fn fetch_modules(db: &SqlitePool, course_id: i64) -> Result<Vec<Module>, sqlx::Error> {
    sqlx::query_as::<_, Module>(
        "SELECT id, course_id, title, description FROM modules WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn insert_module<'e, E>(
    db: E,
    course_id: i64,
    title: &str,
    description: &str,
) -> Result<Module, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Module>(
        r#"
        INSERT INTO modules (course_id, title, description)
        VALUES (?1, ?2, ?3)
        RETURNING id, course_id, title, description
        "#,
    )
    .bind(course_id)
    .bind(title)
    .bind(description)
    .fetch_one(db)
    .await
}

/// Every topic of every module of a course, in creation order.
pub async fn fetch_topics_for_course(db: &SqlitePool, course_id: i64) -> Result<Vec<Topic>, sqlx::Error> {
    sqlx::query_as::<_, Topic>(
        r#"
        SELECT t.id, t.module_id, t.title
        FROM topics t
        JOIN modules m ON m.id = t.module_id
        WHERE m.course_id = ?
        ORDER BY t.id
        "#,
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn insert_topic<'e, E>(db: E, module_id: i64, title: &str) -> Result<Topic, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Topic>(
        "INSERT INTO topics (module_id, title) VALUES (?1, ?2) RETURNING id, module_id, title",
    )
    .bind(module_id)
    .bind(title)
    .fetch_one(db)
    .await
}

pub async fn fetch_active_batches(
    db: &SqlitePool,
    course_id: i64,
) -> Result<Vec<BatchSchedule>, sqlx::Error> {
    sqlx::query_as::<_, BatchSchedule>(&format!(
        r#"
        SELECT {BATCH_COLUMNS}
        FROM batch_schedules
        WHERE course_id = ? AND is_active = 1
        ORDER BY batch_number
        "#
    ))
    .bind(course_id)
    .fetch_all(db)
    .await
}

/// Active batches across all courses, ordered by course title, course id, then batch number.
pub async fn fetch_all_active_batches(db: &SqlitePool) -> Result<Vec<CourseBatchRow>, sqlx::Error> {
    sqlx::query_as::<_, CourseBatchRow>(
        r#"
        SELECT c.title AS course_title, c.slug AS course_slug,
               b.id, b.course_id, b.batch_number, b.title, b.subtitle, b.start_date,
               b.start_day, b.time_slot, b.duration, b.is_active, b.created_at, b.updated_at
        FROM batch_schedules b
        JOIN courses c ON c.id = b.course_id
        WHERE b.is_active = 1
        ORDER BY c.title, c.id, b.batch_number
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn insert_batch_schedule<'e, E>(
    db: E,
    course_id: i64,
    batch: &NewBatchSchedule,
) -> Result<BatchSchedule, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();

    sqlx::query_as::<_, BatchSchedule>(&format!(
        r#"
        INSERT INTO batch_schedules
            (course_id, batch_number, title, subtitle, start_date, start_day,
             time_slot, duration, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        RETURNING {BATCH_COLUMNS}
        "#
    ))
    .bind(course_id)
    .bind(batch.batch_number)
    .bind(&batch.title)
    .bind(&batch.subtitle)
    .bind(batch.start_date)
    .bind(&batch.start_day)
    .bind(&batch.time_slot)
    .bind(&batch.duration)
    .bind(batch.is_active)
    .bind(now)
    .fetch_one(db)
    .await
}

pub async fn find_enrollment(
    db: &SqlitePool,
    email: &str,
    course_id: i64,
) -> Result<Option<EnrollmentRecord>, sqlx::Error> {
    sqlx::query_as::<_, EnrollmentRecord>(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE email = ? AND course_id = ?"
    ))
    .bind(email)
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn is_verified_enrollee(
    db: &SqlitePool,
    email: &str,
    course_id: i64,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE email = ? AND course_id = ? AND is_verified = 1",
    )
    .bind(email)
    .bind(course_id)
    .fetch_one(db)
    .await?;

    Ok(count > 0)
}

/// Inserts an enrollment. Returns `Ok(None)` when the (email, course) pair already exists.
pub async fn insert_enrollment(
    db: &SqlitePool,
    req: NewEnrollment,
) -> Result<Option<EnrollmentRecord>, sqlx::Error> {
    let now = Utc::now();
    let verified_at = req.is_verified.then_some(now);

    let inserted = sqlx::query_as::<_, EnrollmentRecord>(&format!(
        r#"
        INSERT INTO enrollments
            (email, course_id, student_name, phone, extra_info,
             is_verified, verification_token, verified_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)
        RETURNING {ENROLLMENT_COLUMNS}
        "#
    ))
    .bind(&req.email)
    .bind(req.course_id)
    .bind(&req.student_name)
    .bind(&req.phone)
    .bind(&req.extra_info)
    .bind(req.is_verified)
    .bind(verified_at)
    .bind(now)
    .fetch_one(db)
    .await;

    match inserted {
        Ok(record) => Ok(Some(record)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::db::connect_in_memory;

    async fn setup_test_db() -> SqlitePool {
        connect_in_memory().await.expect("Failed to create test db")
    }

    fn new_course(title: &str, slug: Option<&str>) -> NewCourse {
        NewCourse {
            title: title.to_string(),
            slug: slug.map(str::to_string),
            description: format!("Complete {} bootcamp", title),
            image: None,
            students_enrolled: 2000,
            duration: "8-12 weeks".to_string(),
            level: "Beginner".to_string(),
            rating: 4.6,
            modules_count: 5,
        }
    }

    fn new_batch(number: i64, active: bool) -> NewBatchSchedule {
        NewBatchSchedule {
            batch_number: number,
            title: format!("Batch {}", number),
            subtitle: "(Mon-Fri)".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 2, number as u32).expect("valid date"),
            start_day: "Monday".to_string(),
            time_slot: "10:00 AM - 12:00 PM".to_string(),
            duration: "2 hours".to_string(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_course() {
        let pool = setup_test_db().await;

        let course = insert_course(&pool, new_course("Python Programming", Some("python-programming")))
            .await
            .expect("Failed to insert course");
        assert_eq!(course.slug, "python-programming");
        assert!(course.curriculum_file.is_none());

        let found = find_course_by_slug(&pool, "python-programming")
            .await
            .expect("Failed to fetch course")
            .expect("Course not found");
        assert_eq!(found.id, course.id);

        let courses = fetch_courses(&pool).await.expect("Failed to fetch courses");
        assert_eq!(courses.len(), 1);
    }

    #[tokio::test]
    async fn test_slug_derived_from_title() {
        let pool = setup_test_db().await;

        let course = insert_course(&pool, new_course("Machine Learning", None))
            .await
            .expect("Failed to insert course");
        assert!(course.slug.starts_with("machine-learning-"));
        let suffix = course.slug.trim_start_matches("machine-learning-");
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_slug_is_unique_and_immutable() {
        let pool = setup_test_db().await;

        let course = insert_course(&pool, new_course("Python Programming", Some("python")))
            .await
            .expect("Failed to insert course");

        let duplicate = insert_course(&pool, new_course("Python Again", Some("python"))).await;
        assert!(duplicate.is_err());

        let renamed = sqlx::query("UPDATE courses SET slug = 'other' WHERE id = ?")
            .bind(course.id)
            .execute(&pool)
            .await;
        assert!(renamed.is_err());

        let retitled = sqlx::query("UPDATE courses SET title = 'Python 3' WHERE id = ?")
            .bind(course.id)
            .execute(&pool)
            .await;
        assert!(retitled.is_ok());
    }

    #[tokio::test]
    async fn test_active_batches_are_ordered() {
        let pool = setup_test_db().await;
        let course = insert_course(&pool, new_course("Python Programming", Some("python")))
            .await
            .expect("Failed to insert course");

        for (number, active) in [(3, true), (1, true), (2, false), (4, true)] {
            insert_batch_schedule(&pool, course.id, &new_batch(number, active))
                .await
                .expect("Failed to insert batch");
        }

        let batches = fetch_active_batches(&pool, course.id)
            .await
            .expect("Failed to fetch batches");
        let numbers: Vec<i64> = batches.iter().map(|b| b.batch_number).collect();
        assert_eq!(numbers, vec![1, 3, 4]);
        assert!(batches.iter().all(|b| b.is_active));

        let duplicate = insert_batch_schedule(&pool, course.id, &new_batch(1, true)).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_all_active_batches_grouped_by_course_title() {
        let pool = setup_test_db().await;
        let ml = insert_course(&pool, new_course("Machine Learning", Some("ml")))
            .await
            .expect("Failed to insert course");
        let ai = insert_course(&pool, new_course("Artificial Intelligence", Some("ai")))
            .await
            .expect("Failed to insert course");

        insert_batch_schedule(&pool, ml.id, &new_batch(1, true)).await.expect("batch");
        insert_batch_schedule(&pool, ai.id, &new_batch(2, true)).await.expect("batch");
        insert_batch_schedule(&pool, ai.id, &new_batch(1, true)).await.expect("batch");
        insert_batch_schedule(&pool, ai.id, &new_batch(3, false)).await.expect("batch");

        let rows = fetch_all_active_batches(&pool).await.expect("Failed to fetch batches");
        let order: Vec<(String, i64)> = rows
            .iter()
            .map(|r| (r.course_slug.clone(), r.batch.batch_number))
            .collect();
        assert_eq!(
            order,
            vec![("ai".to_string(), 1), ("ai".to_string(), 2), ("ml".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_modules_and_topics_keep_creation_order() {
        let pool = setup_test_db().await;
        let course = insert_course(&pool, new_course("Python Programming", Some("python")))
            .await
            .expect("Failed to insert course");

        let basics = insert_module(&pool, course.id, "Basics", "Variables and loops")
            .await
            .expect("Failed to insert module");
        let oop = insert_module(&pool, course.id, "OOP", "Classes")
            .await
            .expect("Failed to insert module");
        insert_topic(&pool, oop.id, "Inheritance").await.expect("topic");
        insert_topic(&pool, basics.id, "Syntax").await.expect("topic");
        insert_topic(&pool, basics.id, "Loops").await.expect("topic");

        let modules = fetch_modules(&pool, course.id).await.expect("modules");
        assert_eq!(modules[0].title, "Basics");
        assert_eq!(modules[1].title, "OOP");

        let topics = fetch_topics_for_course(&pool, course.id).await.expect("topics");
        let titles: Vec<&str> = topics.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Inheritance", "Syntax", "Loops"]);
    }

    #[tokio::test]
    async fn test_set_curriculum_file() {
        let pool = setup_test_db().await;
        let course = insert_course(&pool, new_course("Python Programming", Some("python")))
            .await
            .expect("Failed to insert course");

        let ok = set_curriculum_file(&pool, course.id, Some("curriculum_files/python/a_1.pdf"), Some(Utc::now()))
            .await
            .expect("Failed to set file");
        assert!(ok);

        let stored = find_course_by_slug(&pool, "python").await.expect("fetch").expect("course");
        assert_eq!(stored.curriculum_file.as_deref(), Some("curriculum_files/python/a_1.pdf"));
        assert!(stored.file_uploaded_at.is_some());

        set_curriculum_file(&pool, course.id, None, Some(Utc::now()))
            .await
            .expect("Failed to clear file");
        let cleared = find_course_by_slug(&pool, "python").await.expect("fetch").expect("course");
        assert!(cleared.curriculum_file.is_none());
        assert!(cleared.file_uploaded_at.is_none());
    }

    #[tokio::test]
    async fn test_enrollment_unique_per_email_and_course() {
        let pool = setup_test_db().await;
        let course = insert_course(&pool, new_course("Python Programming", Some("python")))
            .await
            .expect("Failed to insert course");

        let req = NewEnrollment {
            email: "student@example.com".to_string(),
            course_id: course.id,
            student_name: "Asha".to_string(),
            phone: "9999999999".to_string(),
            extra_info: String::new(),
            is_verified: true,
        };

        let first = insert_enrollment(&pool, req.clone())
            .await
            .expect("Failed to insert enrollment")
            .expect("First insert should succeed");
        assert!(first.is_verified);
        assert!(first.verified_at.is_some());

        let second = insert_enrollment(&pool, req)
            .await
            .expect("Constraint violation should not be an error");
        assert!(second.is_none());

        assert!(find_enrollment(&pool, "student@example.com", course.id)
            .await
            .expect("lookup")
            .is_some());
        assert!(is_verified_enrollee(&pool, "student@example.com", course.id)
            .await
            .expect("lookup"));
        assert!(!is_verified_enrollee(&pool, "other@example.com", course.id)
            .await
            .expect("lookup"));
    }
}
