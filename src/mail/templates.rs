use std::sync::Arc;

use handlebars::Handlebars;
use serde::Serialize;

use super::MailError;

/// Values available to the enrollment email templates.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentEmailData {
    pub student_name: String,
    pub student_email: String,
    pub phone: String,
    pub extra_info: String,
    pub course_title: String,
    pub course_slug: String,
    pub curriculum_attached: bool,
    pub download_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, MailError> {
        let mut handlebars = Handlebars::new();

        for (name, source) in [
            ("student_html", STUDENT_HTML_TEMPLATE),
            ("student_text", STUDENT_TEXT_TEMPLATE),
            ("operations_html", OPERATIONS_HTML_TEMPLATE),
            ("operations_text", OPERATIONS_TEXT_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, source)
                .map_err(|e| MailError::Template(format!("failed to register {}: {}", name, e)))?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    pub fn student_confirmation(&self, data: &EnrollmentEmailData) -> Result<RenderedEmail, MailError> {
        Ok(RenderedEmail {
            subject: format!("{} Curriculum Download", data.course_title),
            html: self.render("student_html", data)?,
            text: self.render("student_text", data)?,
        })
    }

    pub fn operations_notice(&self, data: &EnrollmentEmailData) -> Result<RenderedEmail, MailError> {
        Ok(RenderedEmail {
            subject: format!("New enrollment: {} ({})", data.course_title, data.student_name),
            html: self.render("operations_html", data)?,
            text: self.render("operations_text", data)?,
        })
    }

    fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, MailError> {
        self.handlebars
            .render(name, data)
            .map_err(|e| MailError::Template(format!("failed to render {}: {}", name, e)))
    }
}

const STUDENT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.5;">
  <p>Hi {{student_name}},</p>
  <p>Thank you for enrolling in <strong>{{course_title}}</strong>. Our team will contact you shortly with batch details.</p>
  {{#if curriculum_attached}}
  <p>The course curriculum is attached to this email.</p>
  {{else}}{{#if download_link}}
  <p>You can download the course curriculum here: <a href="{{download_link}}">{{download_link}}</a></p>
  {{/if}}{{/if}}
  <p>Happy learning!</p>
</body>
</html>
"#;

const STUDENT_TEXT_TEMPLATE: &str = r#"Hi {{{student_name}}},

Thank you for enrolling in {{{course_title}}}. Our team will contact you shortly with batch details.
{{#if curriculum_attached}}
The course curriculum is attached to this email.
{{else}}{{#if download_link}}
Download the course curriculum: {{{download_link}}}
{{/if}}{{/if}}
Happy learning!
"#;

const OPERATIONS_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif;">
  <h2>New enrollment</h2>
  <table>
    <tr><td>Course</td><td>{{course_title}} ({{course_slug}})</td></tr>
    <tr><td>Name</td><td>{{student_name}}</td></tr>
    <tr><td>Email</td><td>{{student_email}}</td></tr>
    <tr><td>Phone</td><td>{{phone}}</td></tr>
    <tr><td>Notes</td><td>{{extra_info}}</td></tr>
    <tr><td>Curriculum attached</td><td>{{#if curriculum_attached}}yes{{else}}no{{/if}}</td></tr>
  </table>
</body>
</html>
"#;

const OPERATIONS_TEXT_TEMPLATE: &str = r#"New enrollment

Course: {{{course_title}}} ({{{course_slug}}})
Name: {{{student_name}}}
Email: {{{student_email}}}
Phone: {{{phone}}}
Notes: {{{extra_info}}}
Curriculum attached: {{#if curriculum_attached}}yes{{else}}no{{/if}}
"#;
