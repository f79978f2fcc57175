//! Turning a template and a contact list into [`MessageJob`]s.
//!
//! Rendering runs once per contact, before dispatch: placeholders are
//! substituted in the subject and body, then the template's image and
//! signature are spliced in, and its attachment list is normalised.

mod attachments;
mod html;
mod variables;

pub use attachments::{
    AttachmentFields, RawAttachment, attachments_from_json, content_type_for,
    normalize_attachments,
};
pub use html::{inject_image, inject_signature};
pub use variables::{VARIABLES, substitute_variables, unknown_variables};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    error::ContentError,
    types::{AttachmentRef, Correlation, MessageJob},
};

/// Recipient data available to placeholders.
///
/// Field names follow the contact table; the English aliases are accepted
/// for imports from other sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "name")]
    pub nome: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "phone")]
    pub telefone: Option<String>,
    #[serde(default)]
    pub razao_social: Option<String>,
    #[serde(default)]
    pub fantasy_name: Option<String>,
    #[serde(default)]
    pub cliente: Option<String>,
    #[serde(default)]
    pub empresa: Option<String>,
    #[serde(default, alias = "address")]
    pub endereco: Option<String>,
    #[serde(default, alias = "position")]
    pub cargo: Option<String>,
    #[serde(default, alias = "product")]
    pub produto: Option<String>,
    #[serde(default, alias = "value")]
    pub valor: Option<String>,
    #[serde(default, alias = "due_date")]
    pub vencimento: Option<String>,
}

/// A stored email template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub subject: String,
    pub html: String,
    /// Shown centred after the first paragraph.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Appended below the body.
    #[serde(default)]
    pub signature_image: Option<String>,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
    /// Sender display name for jobs rendered from this template.
    #[serde(default)]
    pub from_name: Option<String>,
}

/// Renders one template for many contacts, normalising its attachments once.
#[derive(Debug, Clone)]
pub struct JobBuilder<'a> {
    template: &'a Template,
    attachments: Vec<AttachmentRef>,
    now: NaiveDateTime,
}

impl<'a> JobBuilder<'a> {
    /// `now` feeds the `{data}` and `{hora}` placeholders.
    #[must_use]
    pub fn new(template: &'a Template, now: NaiveDateTime) -> Self {
        Self {
            template,
            attachments: normalize_attachments(&template.attachments),
            now,
        }
    }

    /// # Errors
    ///
    /// Returns [`ContentError::MissingRecipient`] if the contact has no
    /// email address.
    pub fn build(&self, contact: &Contact, index: usize) -> Result<MessageJob, ContentError> {
        let to = contact
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or(ContentError::MissingRecipient { index })?;

        let subject = substitute_variables(&self.template.subject, contact, self.now);
        let mut html = substitute_variables(&self.template.html, contact, self.now);
        if let Some(image_url) = &self.template.image_url {
            html = inject_image(&html, image_url);
        }
        if let Some(signature) = &self.template.signature_image {
            html = inject_signature(&html, signature);
        }

        Ok(MessageJob {
            index,
            to: to.to_string(),
            subject,
            html,
            attachments: self.attachments.clone(),
            from_name: self.template.from_name.clone(),
            from_address: None,
            correlation: Correlation {
                template_id: self.template.id.clone(),
                template_name: Some(self.template.name.clone()),
                recipient_id: contact.id.clone(),
                recipient_name: contact.nome.clone(),
            },
        })
    }

    /// Render a job per contact, indexed in list order.
    ///
    /// # Errors
    ///
    /// Fails on the first contact without an email address.
    pub fn build_all(&self, contacts: &[Contact]) -> Result<Vec<MessageJob>, ContentError> {
        contacts
            .iter()
            .enumerate()
            .map(|(index, contact)| self.build(contact, index))
            .collect()
    }
}

/// Render a single job. Prefer [`JobBuilder`] for more than one contact.
///
/// # Errors
///
/// See [`JobBuilder::build`].
pub fn render_job(
    template: &Template,
    contact: &Contact,
    index: usize,
    now: NaiveDateTime,
) -> Result<MessageJob, ContentError> {
    JobBuilder::new(template, now).build(contact, index)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 20)
            .and_then(|date| date.and_hms_opt(8, 30, 0))
            .unwrap_or_default()
    }

    fn template() -> Template {
        Template {
            id: Some("tpl-1".to_string()),
            name: "Cobrança".to_string(),
            subject: "Fatura de {NOME}".to_string(),
            html: "<p>Olá {nome}, vence em {vencimento}.</p><p>{empresa}</p>".to_string(),
            image_url: Some("https://cdn.example.com/logo.png".to_string()),
            signature_image: Some("https://cdn.example.com/sig.png".to_string()),
            attachments: vec![RawAttachment::Location(
                "https://files.example.com/boleto.pdf".to_string(),
            )],
            from_name: Some("Financeiro".to_string()),
        }
    }

    fn contact(email: Option<&str>) -> Contact {
        Contact {
            id: Some("c-9".to_string()),
            nome: Some("João".to_string()),
            email: email.map(str::to_string),
            vencimento: Some("10/02/2025".to_string()),
            ..Contact::default()
        }
    }

    #[test]
    fn renders_subject_body_and_correlation() {
        let job = render_job(&template(), &contact(Some(" joao@example.com ")), 7, now())
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(job.index, 7);
        assert_eq!(job.to, "joao@example.com");
        assert_eq!(job.subject, "Fatura de João");
        assert!(job.html.starts_with("<p>Olá João, vence em 10/02/2025.</p><div"));
        assert!(job.html.contains("logo.png"));
        assert!(job.html.ends_with(r#"alt="Signature" /></div>"#));
        assert_eq!(job.from_name.as_deref(), Some("Financeiro"));
        assert_eq!(job.attachments.len(), 1);
        assert_eq!(job.attachments[0].content_type, "application/pdf");
        assert_eq!(
            job.correlation,
            Correlation {
                template_id: Some("tpl-1".to_string()),
                template_name: Some("Cobrança".to_string()),
                recipient_id: Some("c-9".to_string()),
                recipient_name: Some("João".to_string()),
            }
        );
    }

    #[test]
    fn build_all_indexes_in_order_and_stops_on_missing_email() {
        let template = template();
        let builder = JobBuilder::new(&template, now());

        let jobs = builder
            .build_all(&[contact(Some("a@example.com")), contact(Some("b@example.com"))])
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            jobs.iter().map(|job| (job.index, job.to.as_str())).collect::<Vec<_>>(),
            vec![(0, "a@example.com"), (1, "b@example.com")]
        );

        let err = builder
            .build_all(&[contact(Some("a@example.com")), contact(None)])
            .err();
        assert!(matches!(err, Some(ContentError::MissingRecipient { index: 1 })));
    }

    #[test]
    fn english_contact_fields_are_accepted() {
        let contact: Contact = serde_json::from_str(
            r#"{"name": "Ann", "email": "ann@example.com", "phone": "1", "due_date": "tomorrow"}"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(contact.nome.as_deref(), Some("Ann"));
        assert_eq!(contact.telefone.as_deref(), Some("1"));
        assert_eq!(contact.vencimento.as_deref(), Some("tomorrow"));
    }
}
