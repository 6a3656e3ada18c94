mod common;

use std::io::Cursor;
use std::sync::Arc;

use layout_translator::adapters::DocumentAdapter;
use layout_translator::adapters::docx::DocxAdapter;
use layout_translator::data::DocumentFormat;
use layout_translator::model::Degradation;
use layout_translator::{CancelToken, EngineError, IdentityBackend, Job};

use common::{ScriptedBackend, build_docx, engine, paragraph, read_part, settings, uppercase};

fn docx_job(body: &str, lang: &str) -> Job {
    Job {
        bytes: build_docx(body),
        format: DocumentFormat::Docx,
        target_lang: lang.to_string(),
        source_lang: None,
    }
}

#[tokio::test]
async fn one_failed_batch_leaves_the_rest_translated() {
    let body: String = (1..=50).map(|n| paragraph(&format!("Paragraph {}", n))).collect();
    let backend = Arc::new(ScriptedBackend::new(uppercase).failing_on("Paragraph 50"));
    let mut config = settings();
    config.translation.batch_size = 5;
    let engine = engine(config, backend.clone());

    let output = engine.run(docx_job(&body, "fr"), &CancelToken::new()).await.unwrap();
    let diagnostics = &output.diagnostics;
    assert_eq!(diagnostics.units, 50);
    assert_eq!(diagnostics.translated, 45);
    assert_eq!(diagnostics.failed, 5);
    assert_eq!(diagnostics.notes, ["1 of 10 translation batches failed"]);
    let failures: Vec<&str> = diagnostics
        .degradations
        .iter()
        .filter_map(|item| match &item.degradation {
            Degradation::TranslationFailed { reason } => Some(reason.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 5);
    assert!(failures.iter().all(|reason| reason.contains("upstream returned 500")));

    let xml = read_part(&output.bytes, "word/document.xml");
    assert!(xml.contains("PARAGRAPH 45"));
    assert!(xml.contains("Paragraph 46"));
    assert!(xml.contains("Paragraph 50"));
    assert!(!xml.contains("Paragraph 1<"));

    // Ten first attempts plus one retry of the failing batch.
    assert_eq!(backend.calls.lock().unwrap().len(), 11);
}

#[tokio::test]
async fn repeated_paragraphs_are_translated_once() {
    let body = [paragraph("Confidential"), paragraph("Summary"), paragraph("Confidential")].concat();
    let backend = Arc::new(ScriptedBackend::new(uppercase));
    let engine = engine(settings(), backend.clone());

    let output = engine.run(docx_job(&body, "de"), &CancelToken::new()).await.unwrap();
    assert_eq!(output.diagnostics.translated, 3);
    assert_eq!(backend.calls.lock().unwrap().concat(), ["Confidential", "Summary"]);
    assert_eq!(read_part(&output.bytes, "word/document.xml").matches("CONFIDENTIAL").count(), 2);
}

#[tokio::test]
async fn wrong_length_answers_flag_the_batch() {
    /// Answers one string short whenever the batch contains "short".
    struct ShortBackend(ScriptedBackend);

    impl layout_translator::TranslationBackend for ShortBackend {
        fn name(&self) -> &str {
            "short"
        }

        fn translate_batch<'a>(
            &'a self,
            texts: &'a [String],
            source_lang: Option<&'a str>,
            target_lang: &'a str,
        ) -> layout_translator::providers::BackendFuture<'a> {
            Box::pin(async move {
                let mut out = self.0.translate_batch(texts, source_lang, target_lang).await?;
                if texts.iter().any(|text| text.contains("short")) {
                    out.pop();
                }
                Ok(out)
            })
        }
    }

    let body = [paragraph("keep me"), paragraph("short answer")].concat();
    let mut config = settings();
    config.translation.batch_size = 1;
    let engine = engine(config, Arc::new(ShortBackend(ScriptedBackend::new(uppercase))));

    let output = engine.run(docx_job(&body, "fr"), &CancelToken::new()).await.unwrap();
    assert_eq!(output.diagnostics.translated, 1);
    assert_eq!(output.diagnostics.failed, 1);
    let failed = output
        .diagnostics
        .degradations
        .iter()
        .find(|item| matches!(item.degradation, Degradation::TranslationFailed { .. }))
        .unwrap();
    assert_eq!(failed.source, "short answer");
    assert!(matches!(
        &failed.degradation,
        Degradation::TranslationFailed { reason } if reason == "expected 1 translation(s), got 0"
    ));
    let xml = read_part(&output.bytes, "word/document.xml");
    assert!(xml.contains("KEEP ME"));
    assert!(xml.contains("short answer"));
}

#[tokio::test]
async fn math_survives_a_rewording_backend() {
    fn reword(text: &str) -> String {
        text.split(' ')
            .map(|word| if word.starts_with('[') { word } else { "mot" })
            .collect::<Vec<_>>()
            .join(" ")
    }
    let body = paragraph("Compute $x^2 + 1$ and `run()` now");
    let backend = Arc::new(ScriptedBackend::new(reword));
    let engine = engine(settings(), backend.clone());

    let output = engine.run(docx_job(&body, "fr"), &CancelToken::new()).await.unwrap();
    assert_eq!(
        backend.calls.lock().unwrap()[0],
        ["Compute [MATH_INLINE_1] and [CODE_INLINE_1] now"]
    );
    let xml = read_part(&output.bytes, "word/document.xml");
    assert!(xml.contains("mot $x^2 + 1$ mot `run()` mot"), "{}", xml);
}

#[tokio::test]
async fn mixed_bold_paragraph_round_trips() {
    let body = concat!(
        r#"<w:p><w:r><w:t xml:space="preserve">Press </w:t></w:r>"#,
        r#"<w:r><w:rPr><w:b/></w:rPr><w:t>Save</w:t></w:r>"#,
        r#"<w:r><w:t xml:space="preserve"> to continue.</w:t></w:r></w:p>"#,
    );
    let engine = engine(settings(), Arc::new(IdentityBackend));
    let output = engine.run(docx_job(body, "en"), &CancelToken::new()).await.unwrap();

    let reread = DocxAdapter.extract(output.bytes).unwrap();
    let sources: Vec<&str> = reread.units().map(|unit| unit.source.as_str()).collect();
    assert_eq!(sources, ["Press **Save** to continue."]);
}

#[tokio::test]
async fn jpeg_declared_as_pdf_is_rejected() {
    let mut jpeg = Vec::new();
    image::RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30]))
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();
    let engine = engine(settings(), Arc::new(IdentityBackend));
    let job = Job {
        bytes: jpeg,
        format: DocumentFormat::Pdf,
        target_lang: "fr".to_string(),
        source_lang: None,
    };

    let err = engine.run(job, &CancelToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnsupportedOrCorruptInput {
            format: DocumentFormat::Pdf,
            ..
        }
    ));
}

#[tokio::test]
async fn cancelling_before_reconstruction_yields_nothing() {
    let cancel = CancelToken::new();
    let backend = Arc::new(ScriptedBackend::new(uppercase).cancelling(cancel.clone()));
    let engine = engine(settings(), backend);

    let err = engine
        .run(docx_job(&paragraph("Hello"), "fr"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn total_outage_fails_the_job() {
    let backend = Arc::new(ScriptedBackend::new(uppercase).failing_on("e"));
    let engine = engine(settings(), backend);

    let err = engine
        .run(docx_job(&paragraph("Hello there"), "fr"), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TranslationUnavailable { failed_batches: 1, .. }));
}

#[tokio::test]
async fn klingon_falls_back_to_the_default_profile() {
    let engine = engine(settings(), Arc::new(IdentityBackend));
    let output = engine
        .run(docx_job(&paragraph("Hello"), "klingon"), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(output.diagnostics.profile, "latin");
    assert_eq!(output.diagnostics.translated, 1);
}
