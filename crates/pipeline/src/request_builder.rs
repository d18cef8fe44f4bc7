//! Builds the batch render payload from documents and their participants.
//!
//! Pure functions; nothing here touches the database or the transport.

use chrono::NaiveDate;
use serde_json::Value;

use certgen_core::types::JobId;
use certgen_db::models::document::Document;
use certgen_db::models::event::Event;
use certgen_db::models::participant::UserDetail;
use certgen_db::models::template::Template;
use certgen_transport::{BatchRenderRequest, KeyValue, PdfField, RenderItem, JOB_TYPE_GENERATE_DOCS};

/// Placeholder printed where the signer's name goes.
pub const SIGNER_NAME_PLACEHOLDER: &str = "Authorized Signatory";

/// Placeholder printed where the signer's title goes.
pub const SIGNER_TITLE_PLACEHOLDER: &str = "Event Organizer";

/// Date format used for the `date` field, e.g. `19 October 2026`.
pub const DATE_FORMAT: &str = "%d %B %Y";

/// Event-level inputs shared by every item of a batch.
#[derive(Debug, Clone)]
pub struct BatchContext<'a> {
    pub event: &'a Event,
    pub template: &'a Template,
    /// Ordered template field keys.
    pub field_keys: &'a [String],
    pub verification_base_url: &'a str,
    pub issued_on: NaiveDate,
    pub overrides: &'a QrOverrides,
}

/// Caller-supplied QR parameters appended after the defaults.
///
/// Keys may repeat; the renderer applies entries in order, so the last
/// occurrence of a key wins.
#[derive(Debug, Clone, Default)]
pub struct QrOverrides {
    pub qr: Vec<KeyValue>,
    pub qr_pdf: Vec<KeyValue>,
}

/// Resolve one template field for a participant.
///
/// Unknown keys resolve to an empty string.
pub fn resolve_field(key: &str, ctx: &BatchContext<'_>, doc: &Document, user: &UserDetail) -> String {
    match key {
        "participant_name" | "full_name" | "name" => user.full_name.clone(),
        "date" | "issued_on" => ctx.issued_on.format(DATE_FORMAT).to_string(),
        "event_code" => ctx.event.code.clone(),
        "event_name" => ctx.event.name.clone(),
        "serial_code" => doc.serial_code.clone(),
        "verification_code" => doc.verification_code.clone(),
        "signer_name" => SIGNER_NAME_PLACEHOLDER.to_string(),
        "signer_title" => SIGNER_TITLE_PLACEHOLDER.to_string(),
        _ => String::new(),
    }
}

/// Public verification URL for a code.
pub fn verification_url(base_url: &str, code: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{code}")
    } else {
        format!("{base_url}/{code}")
    }
}

/// Default QR generation parameters, followed by any overrides.
pub fn qr_params(ctx: &BatchContext<'_>, doc: &Document) -> Vec<KeyValue> {
    let mut params = vec![
        KeyValue::new("data", verification_url(ctx.verification_base_url, &doc.verification_code)),
        KeyValue::new("verification_code", doc.verification_code.clone()),
        KeyValue::new("size", 300),
        KeyValue::new("margin", 4),
        KeyValue::new("error_correction", "M"),
    ];
    params.extend(ctx.overrides.qr.iter().cloned());
    params
}

/// Default QR placement inside the PDF (page, rectangle in points),
/// followed by any overrides.
pub fn qr_pdf_params(ctx: &BatchContext<'_>) -> Vec<KeyValue> {
    let mut params = vec![
        KeyValue::new("page", 1),
        KeyValue::new("x", 460),
        KeyValue::new("y", 40),
        KeyValue::new("width", 96),
        KeyValue::new("height", 96),
    ];
    params.extend(ctx.overrides.qr_pdf.iter().cloned());
    params
}

/// Value a consumer will apply for `key`: its last occurrence.
pub fn effective_param<'a>(params: &'a [KeyValue], key: &str) -> Option<&'a Value> {
    params.iter().rev().find(|kv| kv.key == key).map(|kv| &kv.value)
}

/// One render item; `client_ref` is the document id.
pub fn build_item(ctx: &BatchContext<'_>, doc: &Document, user: &UserDetail) -> RenderItem {
    let pdf_fields = ctx
        .field_keys
        .iter()
        .map(|key| PdfField {
            key: key.clone(),
            value: resolve_field(key, ctx, doc, user),
        })
        .collect();

    RenderItem {
        client_ref: doc.id.to_string(),
        template_ref: ctx.template.file_ref.clone(),
        user_ref: user.id,
        is_public: doc.is_public,
        qr: qr_params(ctx, doc),
        qr_pdf: qr_pdf_params(ctx),
        pdf_fields,
    }
}

/// Assemble the batch payload for a job.
pub fn build_batch_request(
    job_id: JobId,
    ctx: &BatchContext<'_>,
    entries: &[(&Document, &UserDetail)],
) -> BatchRenderRequest {
    BatchRenderRequest {
        job_id,
        job_type: JOB_TYPE_GENERATE_DOCS.to_string(),
        event_id: Some(ctx.event.id),
        items: entries
            .iter()
            .map(|(doc, user)| build_item(ctx, doc, user))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use certgen_core::document_status::DocumentStatus;
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn event() -> Event {
        Event {
            id: 3,
            code: "DEVCONF".to_string(),
            name: "Developer Conference".to_string(),
            template_id: Some(8),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn template() -> Template {
        Template {
            id: 8,
            name: "Attendance".to_string(),
            series: "A".to_string(),
            file_ref: "templates/attendance.pdf".to_string(),
            is_public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn document() -> Document {
        Document {
            id: 41,
            event_id: Some(3),
            user_detail_id: 5,
            template_id: Some(8),
            serial_code: "DEVCONF-A-00001".to_string(),
            verification_code: "CERT-ABCDEFGH23".to_string(),
            status_id: DocumentStatus::Created.id(),
            digital_signature_status: "UNSIGNED".to_string(),
            required_signatures: 0,
            signed_signatures: 0,
            is_public: true,
            pdf_job_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user() -> UserDetail {
        UserDetail {
            id: 5,
            full_name: "Ada Lovelace".to_string(),
            email: None,
            created_at: Utc::now(),
        }
    }

    fn with_ctx<R>(overrides: QrOverrides, f: impl FnOnce(&BatchContext<'_>) -> R) -> R {
        let event = event();
        let template = template();
        let keys = vec![
            "participant_name".to_string(),
            "date".to_string(),
            "event_code".to_string(),
            "signer_name".to_string(),
            "mystery".to_string(),
        ];
        let ctx = BatchContext {
            event: &event,
            template: &template,
            field_keys: &keys,
            verification_base_url: "https://verify.test/v",
            issued_on: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            overrides: &overrides,
        };
        f(&ctx)
    }

    #[test]
    fn fields_resolve_in_template_order() {
        let item = with_ctx(QrOverrides::default(), |ctx| build_item(ctx, &document(), &user()));
        let fields: Vec<(&str, &str)> = item
            .pdf_fields
            .iter()
            .map(|f| (f.key.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("participant_name", "Ada Lovelace"),
                ("date", "09 March 2026"),
                ("event_code", "DEVCONF"),
                ("signer_name", SIGNER_NAME_PLACEHOLDER),
                ("mystery", ""),
            ]
        );
        assert_eq!(item.client_ref, "41");
        assert_eq!(item.user_ref, 5);
        assert_eq!(item.template_ref, "templates/attendance.pdf");
    }

    #[test]
    fn qr_defaults_encode_verification_url() {
        let item = with_ctx(QrOverrides::default(), |ctx| build_item(ctx, &document(), &user()));
        assert_eq!(
            effective_param(&item.qr, "data"),
            Some(&json!("https://verify.test/v/CERT-ABCDEFGH23"))
        );
        assert_eq!(effective_param(&item.qr_pdf, "page"), Some(&json!(1)));
    }

    #[test]
    fn overrides_are_appended_and_last_wins() {
        let overrides = QrOverrides {
            qr: vec![KeyValue::new("size", 200), KeyValue::new("size", 180)],
            qr_pdf: vec![KeyValue::new("page", 2)],
        };
        let item = with_ctx(overrides, |ctx| build_item(ctx, &document(), &user()));

        // Defaults are kept; duplicates are tolerated.
        assert_eq!(item.qr.iter().filter(|kv| kv.key == "size").count(), 3);
        assert_eq!(effective_param(&item.qr, "size"), Some(&json!(180)));
        assert_eq!(effective_param(&item.qr_pdf, "page"), Some(&json!(2)));
        assert_eq!(effective_param(&item.qr_pdf, "x"), Some(&json!(460)));
    }

    #[test]
    fn batch_request_carries_job_and_event() {
        let doc = document();
        let user = user();
        let job_id = uuid::Uuid::new_v4();
        let request = with_ctx(QrOverrides::default(), |ctx| {
            build_batch_request(job_id, ctx, &[(&doc, &user)])
        });
        assert_eq!(request.job_id, job_id);
        assert_eq!(request.job_type, JOB_TYPE_GENERATE_DOCS);
        assert_eq!(request.event_id, Some(3));
        assert_eq!(request.items.len(), 1);
    }

    #[test]
    fn verification_url_joins_with_single_slash() {
        assert_eq!(verification_url("https://a/v/", "X"), "https://a/v/X");
        assert_eq!(verification_url("https://a/v", "X"), "https://a/v/X");
    }
}
