use anyhow::Result;
use clap::Parser;
use tracing::warn;

use layout_translator::CancelToken;

#[derive(Parser, Debug)]
#[command(
    name = "layout-translator",
    version,
    about = "Translate PDF, DOCX and image documents while keeping their layout"
)]
struct Cli {
    /// Document to translate (pdf, docx, png, jpeg)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Format of --data (auto, pdf, docx, image/png, image/jpeg)
    #[arg(short = 'M', long = "data-mime", default_value = "auto")]
    data_mime: String,

    /// Target language (name, ISO code or script profile id)
    #[arg(short = 'l', long = "lang", default_value = "en")]
    lang: String,

    /// Source language. Use "auto" to detect.
    #[arg(short = 'L', long = "source-lang", default_value = "auto")]
    source_lang: String,

    /// Output file (default: <name>.<lang>.<ext> next to the input)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Write a JSON diagnostics summary to this file
    #[arg(long = "diagnostics")]
    diagnostics: Option<String>,

    /// Gemini model name
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings")]
    settings: Option<String>,

    /// Directory holding the script font files
    #[arg(long = "fonts-dir")]
    fonts_dir: Option<String>,

    /// Tesseract language list for image inputs (e.g. eng+jpn)
    #[arg(long = "ocr-languages")]
    ocr_languages: Option<String>,

    /// Skip the translation backend and re-render the source text
    #[arg(long = "no-translate")]
    no_translate: bool,

    /// Show the script profiles and the languages they cover, then exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    layout_translator::logging::init(cli.verbose)?;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling the job");
            trigger.cancel();
        }
    });

    let output = layout_translator::run(
        layout_translator::Config {
            data: cli.data,
            data_mime: Some(cli.data_mime),
            lang: cli.lang,
            source_lang: cli.source_lang,
            output: cli.output,
            diagnostics: cli.diagnostics,
            model: cli.model,
            key: cli.key,
            settings_path: cli.settings,
            fonts_dir: cli.fonts_dir,
            ocr_languages: cli.ocr_languages,
            no_translate: cli.no_translate,
            show_languages: cli.show_languages,
        },
        cancel,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
