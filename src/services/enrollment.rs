use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::repository;
use crate::error::AppError;
use crate::mail::{EnrollmentEmailData, MailAttachment, Mailer, OutgoingEmail, TemplateEngine};
use crate::models::{
    Course, EnrollmentRecord, EnrollmentRequest, EnrollmentResponse, NewEnrollment,
    SideEffectReport, SideEffectResult, VerifyEmailResponse,
};
use crate::storage::{CurriculumDocument, CurriculumStore};
use crate::validation::EmailValidator;
use crate::webhook::{EnrollmentRecordPayload, WebhookClient};

/// Runs an enrollment: validation, persistence, then the best-effort notifications.
///
/// Once the record is saved the request succeeds. Webhook and mail failures are
/// reported in [`SideEffectReport`] and never turn into an error response.
pub struct EnrollmentService {
    db: SqlitePool,
    validator: EmailValidator,
    webhook: Option<Arc<dyn WebhookClient>>,
    mailer: Option<Arc<dyn Mailer>>,
    templates: TemplateEngine,
    curriculum: CurriculumStore,
    config: Arc<AppConfig>,
}

/// Trimmed request fields. The email is lowercased.
struct Applicant {
    name: String,
    email: String,
    phone: String,
    extra_info: String,
    course_slug: String,
}

impl Applicant {
    fn from_request(req: EnrollmentRequest) -> Result<Self, AppError> {
        let applicant = Self {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            phone: req.phone.trim().to_string(),
            extra_info: req.extra_info.trim().to_string(),
            course_slug: req.course_slug.trim().to_string(),
        };

        if applicant.name.is_empty()
            || applicant.email.is_empty()
            || applicant.phone.is_empty()
            || applicant.course_slug.is_empty()
        {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        }

        Ok(applicant)
    }
}

impl EnrollmentService {
    pub fn new(
        db: SqlitePool,
        validator: EmailValidator,
        webhook: Option<Arc<dyn WebhookClient>>,
        mailer: Option<Arc<dyn Mailer>>,
        templates: TemplateEngine,
        curriculum: CurriculumStore,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            validator,
            webhook,
            mailer,
            templates,
            curriculum,
            config,
        }
    }

    pub async fn verify_email(&self, email: &str) -> VerifyEmailResponse {
        let verdict = self.validator.classify(email).await;
        VerifyEmailResponse {
            is_valid: verdict.is_valid(),
            reason: verdict.reason(),
        }
    }

    pub async fn enroll(&self, req: EnrollmentRequest) -> Result<EnrollmentResponse, AppError> {
        let applicant = Applicant::from_request(req)?;

        let verdict = self.validator.classify(&applicant.email).await;
        if !verdict.is_valid() {
            info!(email = %applicant.email, reason = %verdict.reason(), "enrollment rejected: invalid email");
            return Err(AppError::InvalidEmail(verdict.reason()));
        }

        let course = repository::find_course_by_slug(&self.db, &applicant.course_slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        if repository::find_enrollment(&self.db, &applicant.email, course.id)
            .await?
            .is_some()
        {
            info!(email = %applicant.email, course = %course.slug, "enrollment rejected: already enrolled");
            return Err(AppError::AlreadyEnrolled);
        }

        let record = self.save_enrollment(&applicant, &course).await?;

        let webhook = self.notify_webhook(&record, &course).await;

        let document = match self.curriculum.load(&course).await {
            Ok(document) => document,
            Err(e) => {
                warn!(course = %course.slug, error = %e, "could not read curriculum for attachment");
                None
            }
        };
        let curriculum_available = document.is_some();

        let student_email = self.send_student_email(&record, &course, document).await;
        let curriculum_attached = student_email.succeeded && curriculum_available;
        let operations_email = self
            .send_operations_email(&record, &course, curriculum_attached)
            .await;

        let message = completion_message(&student_email, curriculum_attached, curriculum_available);
        let side_effects = SideEffectReport {
            webhook,
            student_email,
            operations_email,
            curriculum_attached,
        };
        info!(email = %record.email, course = %course.slug, side_effects = ?side_effects, "enrollment completed");

        Ok(EnrollmentResponse {
            success: true,
            message,
            curriculum_download_url: curriculum_available
                .then(|| self.config.download_url(&course.slug)),
            side_effects,
        })
    }

    /// Inserts the verified row. The unique constraint settles races the lookup cannot see.
    async fn save_enrollment(
        &self,
        applicant: &Applicant,
        course: &Course,
    ) -> Result<EnrollmentRecord, AppError> {
        let inserted = repository::insert_enrollment(
            &self.db,
            NewEnrollment {
                email: applicant.email.clone(),
                course_id: course.id,
                student_name: applicant.name.clone(),
                phone: applicant.phone.clone(),
                extra_info: applicant.extra_info.clone(),
                is_verified: true,
            },
        )
        .await?;

        let Some(record) = inserted else {
            info!(email = %applicant.email, course = %course.slug, "enrollment rejected by unique constraint");
            return Err(AppError::AlreadyEnrolled);
        };

        info!(
            enrollment_id = record.id,
            email = %record.email,
            course = %course.slug,
            "enrollment saved"
        );
        Ok(record)
    }

    async fn notify_webhook(&self, record: &EnrollmentRecord, course: &Course) -> SideEffectResult {
        let Some(webhook) = &self.webhook else {
            return SideEffectResult::skipped();
        };

        let payload = EnrollmentRecordPayload {
            name: record.student_name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            extra_info: record.extra_info.clone(),
            course_slug: course.slug.clone(),
            course_title: course.title.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        match webhook.post_enrollment(&payload).await {
            Ok(()) => SideEffectResult::succeeded(),
            Err(e) => {
                warn!(email = %record.email, error = %e, "enrollment webhook failed");
                SideEffectResult::failed(e.to_string())
            }
        }
    }

    async fn send_student_email(
        &self,
        record: &EnrollmentRecord,
        course: &Course,
        document: Option<CurriculumDocument>,
    ) -> SideEffectResult {
        let Some(mailer) = &self.mailer else {
            return SideEffectResult::skipped();
        };

        let data = EnrollmentEmailData {
            curriculum_attached: document.is_some(),
            download_link: document
                .is_none()
                .then(|| self.config.download_url(&course.slug)),
            ..self.email_data(record, course)
        };

        let rendered = match self.templates.student_confirmation(&data) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "failed to render student email");
                return SideEffectResult::failed(e.to_string());
            }
        };

        let email = OutgoingEmail {
            to_email: record.email.clone(),
            to_name: record.student_name.clone(),
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
            attachment: document.map(|doc| MailAttachment {
                filename: doc.filename,
                content_type: doc.content_type,
                bytes: doc.bytes,
            }),
        };

        match mailer.send(&email).await {
            Ok(()) => SideEffectResult::succeeded(),
            Err(e) => {
                warn!(to = %record.email, error = %e, "student email failed");
                SideEffectResult::failed(e.to_string())
            }
        }
    }

    async fn send_operations_email(
        &self,
        record: &EnrollmentRecord,
        course: &Course,
        curriculum_attached: bool,
    ) -> SideEffectResult {
        let (Some(mailer), Some(to)) = (&self.mailer, &self.config.operations_email) else {
            return SideEffectResult::skipped();
        };

        let data = EnrollmentEmailData {
            curriculum_attached,
            ..self.email_data(record, course)
        };

        let rendered = match self.templates.operations_notice(&data) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "failed to render operations email");
                return SideEffectResult::failed(e.to_string());
            }
        };

        let email = OutgoingEmail {
            to_email: to.clone(),
            to_name: String::new(),
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
            attachment: None,
        };

        match mailer.send(&email).await {
            Ok(()) => SideEffectResult::succeeded(),
            Err(e) => {
                warn!(to = %to, error = %e, "operations email failed");
                SideEffectResult::failed(e.to_string())
            }
        }
    }

    fn email_data(&self, record: &EnrollmentRecord, course: &Course) -> EnrollmentEmailData {
        EnrollmentEmailData {
            student_name: record.student_name.clone(),
            student_email: record.email.clone(),
            phone: record.phone.clone(),
            extra_info: record.extra_info.clone(),
            course_title: course.title.clone(),
            course_slug: course.slug.clone(),
            curriculum_attached: false,
            download_link: None,
        }
    }
}

fn completion_message(
    student_email: &SideEffectResult,
    curriculum_attached: bool,
    curriculum_available: bool,
) -> String {
    let follow_up = if curriculum_attached {
        "The curriculum has been sent to your email as an attachment."
    } else if student_email.succeeded {
        "A confirmation email with the curriculum download link has been sent."
    } else if !student_email.attempted && curriculum_available {
        "Please use the download link provided to get the curriculum."
    } else if !student_email.attempted {
        "Our team will contact you shortly."
    } else if curriculum_available {
        "We could not send a confirmation email. Please use the download link provided."
    } else {
        "We could not send a confirmation email. Our team will contact you shortly."
    };
    format!("Enrollment successful! {}", follow_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::mail::RecordingMailer;
    use crate::models::NewCourse;
    use crate::validation::{MxOutcome, StaticMxResolver};
    use crate::webhook::RecordingWebhookClient;

    struct Harness {
        pool: SqlitePool,
        webhook: Arc<RecordingWebhookClient>,
        mailer: Arc<RecordingMailer>,
        service: EnrollmentService,
        _media: tempfile::TempDir,
    }

    async fn harness(webhook: RecordingWebhookClient, mailer: RecordingMailer, with_file: bool) -> Harness {
        let pool = db::connect_in_memory().await.expect("db");
        let media = tempfile::tempdir().expect("tempdir");
        let store = CurriculumStore::new(media.path(), 1024 * 1024);

        let course = repository::insert_course(
            &pool,
            NewCourse {
                title: "Python Programming".to_string(),
                slug: Some("python-programming".to_string()),
                description: String::new(),
                image: None,
                students_enrolled: 0,
                duration: String::new(),
                level: String::new(),
                rating: 4.5,
                modules_count: 0,
            },
        )
        .await
        .expect("course");

        if with_file {
            let relative = store
                .store(&course.slug, "syllabus.pdf", b"%PDF-1.4 python")
                .await
                .expect("store");
            repository::set_curriculum_file(&pool, course.id, Some(&relative), Some(Utc::now()))
                .await
                .expect("set file");
        }

        let config = Arc::new(AppConfig {
            public_base_url: "http://catalog.test".to_string(),
            operations_email: Some("ops@catalog.test".to_string()),
            ..AppConfig::default()
        });
        let resolver = StaticMxResolver::new(MxOutcome::Found)
            .with("nomx.example", MxOutcome::NoRecords);

        let webhook = Arc::new(webhook);
        let mailer = Arc::new(mailer);
        let service = EnrollmentService::new(
            pool.clone(),
            EmailValidator::new(Arc::new(resolver)),
            Some(webhook.clone() as Arc<dyn WebhookClient>),
            Some(mailer.clone() as Arc<dyn Mailer>),
            TemplateEngine::new().expect("templates"),
            store,
            config,
        );

        Harness {
            pool,
            webhook,
            mailer,
            service,
            _media: media,
        }
    }

    fn request(email: &str) -> EnrollmentRequest {
        EnrollmentRequest {
            name: "Asha Rao".to_string(),
            email: email.to_string(),
            phone: "9999999999".to_string(),
            extra_info: "weekend batch".to_string(),
            course_slug: "python-programming".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enroll_with_attachment() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), true).await;

        let response = h.service.enroll(request("  Asha@Example.com ")).await.expect("enroll");
        assert!(response.success);
        assert!(response.side_effects.curriculum_attached);
        assert_eq!(response.side_effects.webhook, SideEffectResult::succeeded());
        assert_eq!(response.side_effects.student_email, SideEffectResult::succeeded());
        assert_eq!(response.side_effects.operations_email, SideEffectResult::succeeded());
        assert!(response.message.contains("attachment"));
        assert_eq!(
            response.curriculum_download_url.as_deref(),
            Some("http://catalog.test/courses/python-programming/download-curriculum/")
        );

        let stored = repository::find_enrollment(&h.pool, "asha@example.com", 1)
            .await
            .expect("query")
            .expect("stored enrollment");
        assert!(stored.is_verified);
        assert!(stored.verified_at.is_some());
        assert_eq!(stored.extra_info, "weekend batch");

        let posted = h.webhook.records();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].email, "asha@example.com");
        assert_eq!(posted[0].course_title, "Python Programming");

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 2);
        let student = &sent[0];
        assert_eq!(student.subject, "Python Programming Curriculum Download");
        let attachment = student.attachment.as_ref().expect("attachment");
        assert_eq!(attachment.filename, "Python Programming_Curriculum.pdf");
        assert_eq!(attachment.bytes, b"%PDF-1.4 python");
        assert_eq!(sent[1].to_email, "ops@catalog.test");
        assert!(sent[1].attachment.is_none());
    }

    #[tokio::test]
    async fn test_enroll_without_file_sends_download_link() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;

        let response = h.service.enroll(request("asha@example.com")).await.expect("enroll");
        assert!(!response.side_effects.curriculum_attached);
        assert!(response.curriculum_download_url.is_none());
        assert!(response.message.contains("download link"));

        let sent = h.mailer.sent();
        assert!(sent[0].attachment.is_none());
        assert!(sent[0].text_body.contains("/courses/python-programming/download-curriculum/"));
    }

    #[tokio::test]
    async fn test_second_enrollment_is_rejected() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;

        h.service.enroll(request("asha@example.com")).await.expect("first");
        let second = h.service.enroll(request("ASHA@example.com")).await;
        assert!(matches!(second, Err(AppError::AlreadyEnrolled)));
        assert_eq!(h.webhook.records().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;

        let missing = h
            .service
            .enroll(EnrollmentRequest {
                phone: "   ".to_string(),
                ..request("asha@example.com")
            })
            .await;
        assert!(matches!(missing, Err(AppError::BadRequest(ref m)) if m == "Missing required fields"));

        let syntax = h.service.enroll(request("not-an-email")).await;
        assert!(matches!(syntax, Err(AppError::InvalidEmail(ref r)) if r == "Invalid email format"));

        let no_mx = h.service.enroll(request("someone@nomx.example")).await;
        assert!(matches!(no_mx, Err(AppError::InvalidEmail(ref r)) if r.contains("no MX records")));

        let unknown_course = h
            .service
            .enroll(EnrollmentRequest {
                course_slug: "rust".to_string(),
                ..request("asha@example.com")
            })
            .await;
        assert!(matches!(unknown_course, Err(AppError::NotFound(_))));

        assert!(h.webhook.records().is_empty());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_side_effect_failures_do_not_fail_enrollment() {
        let h = harness(
            RecordingWebhookClient::failing("connection refused"),
            RecordingMailer::rejecting(&["asha@example.com"]),
            true,
        )
        .await;

        let response = h.service.enroll(request("asha@example.com")).await.expect("enroll");
        assert!(response.success);
        assert!(!response.side_effects.webhook.succeeded);
        assert!(response.side_effects.webhook.attempted);
        assert!(
            response.side_effects.webhook.error.as_deref().unwrap_or_default().contains("connection refused")
        );
        assert!(!response.side_effects.student_email.succeeded);
        assert!(!response.side_effects.curriculum_attached);
        assert!(response.side_effects.operations_email.succeeded);
        assert!(response.message.contains("could not send"));
        assert!(response.curriculum_download_url.is_some());

        let stored = repository::find_enrollment(&h.pool, "asha@example.com", 1)
            .await
            .expect("query");
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_unconfigured_side_effects_are_skipped() {
        let pool = db::connect_in_memory().await.expect("db");
        let media = tempfile::tempdir().expect("tempdir");
        repository::insert_course(
            &pool,
            NewCourse {
                title: "Data Science".to_string(),
                slug: None,
                description: String::new(),
                image: None,
                students_enrolled: 0,
                duration: String::new(),
                level: String::new(),
                rating: 0.0,
                modules_count: 0,
            },
        )
        .await
        .expect("course");
        let slug = repository::fetch_courses(&pool).await.expect("courses")[0].slug.clone();

        let service = EnrollmentService::new(
            pool,
            EmailValidator::new(Arc::new(StaticMxResolver::new(MxOutcome::Found))),
            None,
            None,
            TemplateEngine::new().expect("templates"),
            CurriculumStore::new(media.path(), 1024),
            Arc::new(AppConfig::default()),
        );

        let response = service
            .enroll(EnrollmentRequest {
                course_slug: slug,
                ..request("asha@example.com")
            })
            .await
            .expect("enroll");
        assert_eq!(response.side_effects.webhook, SideEffectResult::skipped());
        assert_eq!(response.side_effects.student_email, SideEffectResult::skipped());
        assert_eq!(response.side_effects.operations_email, SideEffectResult::skipped());
        assert_eq!(response.message, "Enrollment successful! Our team will contact you shortly.");
        assert!(!response.message.contains("could not send"));
    }

    #[test]
    fn test_completion_message_distinguishes_skipped_from_failed_email() {
        let skipped = SideEffectResult::skipped();
        let failed = SideEffectResult::failed("smtp down".to_string());

        let with_link = completion_message(&skipped, false, true);
        assert_eq!(
            with_link,
            "Enrollment successful! Please use the download link provided to get the curriculum."
        );
        assert!(completion_message(&failed, false, true).contains("could not send"));
        assert!(completion_message(&failed, false, false).contains("could not send"));
        assert!(!completion_message(&skipped, false, false).contains("could not send"));
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_row_inserted_after_lookup() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;
        let course = repository::find_course_by_slug(&h.pool, "python-programming")
            .await
            .expect("query")
            .expect("course");
        let applicant = Applicant::from_request(request("asha@example.com")).expect("applicant");

        // a concurrent request lands between the duplicate lookup and the insert
        repository::insert_enrollment(
            &h.pool,
            NewEnrollment {
                email: "asha@example.com".to_string(),
                course_id: course.id,
                student_name: "Asha".to_string(),
                phone: "1".to_string(),
                extra_info: String::new(),
                is_verified: true,
            },
        )
        .await
        .expect("insert")
        .expect("first row");

        let result = h.service.save_enrollment(&applicant, &course).await;
        assert!(matches!(result, Err(AppError::AlreadyEnrolled)));
        assert!(h.webhook.records().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enrollments_store_one_row() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;

        let (first, second) = tokio::join!(
            h.service.enroll(request("asha@example.com")),
            h.service.enroll(request("Asha@Example.com")),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AppError::AlreadyEnrolled)))
                .count(),
            1
        );

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
            .fetch_one(&h.pool)
            .await
            .expect("count");
        assert_eq!(stored, 1);
        assert_eq!(h.webhook.records().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_email_reasons() {
        let h = harness(RecordingWebhookClient::default(), RecordingMailer::default(), false).await;

        let ok = h.service.verify_email("asha@example.com").await;
        assert!(ok.is_valid);
        assert_eq!(ok.reason, "Email is valid");

        let no_mx = h.service.verify_email("a@nomx.example").await;
        assert!(!no_mx.is_valid);
        assert!(no_mx.reason.contains("no MX records"));
    }
}
