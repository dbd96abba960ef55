//! Application composition root.
//!
//! Wires configuration, audio sources, the streaming pipeline, stores, and
//! the report generator behind the CLI commands.

use crate::audio::source::AudioSource;
use crate::audio::wav::WavAudioSource;
use crate::config::Config;
use crate::error::Result;
use crate::report::{MedicalReport, ReportGenerator, VertexModel};
use crate::store::{ReportStore, TranscriptStore};
use crate::streaming::cloud::CloudRecognizer;
use crate::streaming::pipeline::{
    ConversationOutcome, ConversationPipeline, PipelineConfig, PipelineHandle,
};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Record from the microphone until Ctrl-C, `max_duration`, or a fatal
/// streaming error, then persist the conversation.
#[cfg(feature = "cpal-audio")]
pub async fn run_record(
    mut config: Config,
    device: Option<String>,
    language: Option<String>,
    max_duration: Option<Duration>,
    quiet: bool,
) -> Result<()> {
    if let Some(language) = language {
        config.streaming.language = language;
    }
    if let Some(device) = device {
        config.audio.device = Some(device);
    }

    let source = crate::audio::capture::CpalAudioSource::new(config.audio.device.as_deref())?;
    let handle = start_pipeline(&config, source)?;

    if !quiet {
        println!(
            "{} conversation {} ({})",
            "Recording".green().bold(),
            handle.conversation_id(),
            config.streaming.language
        );
        println!("Press Ctrl-C to stop.\n");
    }

    let outcome = drive_to_completion(handle, quiet, max_duration).await;
    persist_outcome(&config, outcome, quiet)
}

#[cfg(not(feature = "cpal-audio"))]
pub async fn run_record(
    _config: Config,
    _device: Option<String>,
    _language: Option<String>,
    _max_duration: Option<Duration>,
    _quiet: bool,
) -> Result<()> {
    Err(crate::error::MedscribeError::Device {
        message: "this build has no microphone support (cpal-audio feature disabled)".to_string(),
    })
}

/// Transcribe a WAV file through the same streaming pipeline.
pub async fn run_transcribe(
    mut config: Config,
    file: &Path,
    language: Option<String>,
    quiet: bool,
) -> Result<()> {
    if let Some(language) = language {
        config.streaming.language = language;
    }

    let source = WavAudioSource::open(file)?;
    if !quiet {
        println!(
            "Transcribing {} ({:.1}s of audio)",
            file.display(),
            source.duration().as_secs_f64()
        );
    }

    let handle = start_pipeline(&config, source)?;
    let outcome = drive_to_completion(handle, quiet, None).await;
    persist_outcome(&config, outcome, quiet)
}

/// Generate and persist a report (or print an assessment) for a stored
/// conversation.
pub async fn run_report(config: Config, conversation: &str, assessment: bool) -> Result<()> {
    let data_dir = config.data_dir();
    let transcripts = TranscriptStore::new(&data_dir);
    let record = transcripts.load(conversation)?;

    let model = VertexModel::from_config(&config.report)?;
    let generator = ReportGenerator::with_config(model, (&config.report).into());

    if assessment {
        let text = generator.generate_assessment(&record.transcript).await?;
        println!("{}", "AI ASSESSMENT".bold());
        println!("{}", "=".repeat(60));
        println!("{}", text);
        return Ok(());
    }

    let report = generator.generate(&record.id, &record.transcript).await?;
    ReportStore::new(&data_dir).save(&report)?;
    print_report(record.number, &report);
    Ok(())
}

/// List stored conversations, newest first.
pub fn run_sessions(config: Config, limit: usize) -> Result<()> {
    let records = TranscriptStore::new(&config.data_dir()).list()?;
    if records.is_empty() {
        println!("No conversations recorded yet.");
        return Ok(());
    }

    for record in records.iter().take(limit) {
        let preview: String = record.transcript.chars().take(60).collect();
        let ellipsis = if record.transcript.chars().count() > 60 {
            "…"
        } else {
            ""
        };
        println!(
            "{:>4}  {}  {:>5} words  {}  {}{}",
            format!("#{}", record.number).bold(),
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.word_count,
            record.language,
            preview,
            ellipsis
        );
    }
    Ok(())
}

/// List audio input devices.
pub fn run_devices() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    {
        let devices = crate::audio::capture::list_devices()?;
        if devices.is_empty() {
            println!("No input devices found.");
        } else {
            for device in devices {
                println!("{}", device);
            }
        }
        Ok(())
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        Err(crate::error::MedscribeError::Device {
            message: "this build has no microphone support (cpal-audio feature disabled)"
                .to_string(),
        })
    }
}

fn start_pipeline<A: AudioSource + 'static>(
    config: &Config,
    source: A,
) -> Result<PipelineHandle> {
    let recognizer = CloudRecognizer::from_config(&config.streaming);
    let pipeline =
        ConversationPipeline::with_config(recognizer, PipelineConfig::from_config(config));
    pipeline.start(source)
}

/// Runs the live display until the pipeline finishes, Ctrl-C, or the
/// optional deadline, then stops and waits the pipeline out.
async fn drive_to_completion(
    handle: PipelineHandle,
    quiet: bool,
    max_duration: Option<Duration>,
) -> ConversationOutcome {
    let deadline = async move {
        match max_duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut printed_finals = 0usize;

    loop {
        if handle.is_finished() {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                if !quiet {
                    printed_finals = render_live(&handle, printed_finals);
                }
            }
        }
    }

    handle.stop();
    let outcome = handle.wait().await;

    if !quiet {
        // Flush finals that arrived during the drain.
        let transcript = outcome.session.transcript();
        print!("\r\x1b[K");
        for result in transcript.finals().iter().skip(printed_finals) {
            println!("{}", result.text);
        }
        let _ = std::io::stdout().flush();
    }
    outcome
}

/// Prints newly finalized lines and the current interim hypothesis.
fn render_live(handle: &PipelineHandle, printed_finals: usize) -> usize {
    let transcript = handle.snapshot();
    let finals = transcript.finals();

    if finals.len() > printed_finals {
        print!("\r\x1b[K");
        for result in &finals[printed_finals..] {
            println!("{}", result.text);
        }
    }
    if let Some(interim) = transcript.interim() {
        print!("\r\x1b[K{}", interim.text.dimmed());
    }
    let _ = std::io::stdout().flush();
    finals.len()
}

/// Saves the conversation (including a partial one after a failure) and
/// reports how it ended.
fn persist_outcome(config: &Config, outcome: ConversationOutcome, quiet: bool) -> Result<()> {
    let record = TranscriptStore::new(&config.data_dir()).save(&outcome.session)?;

    if !quiet {
        println!(
            "\nSaved conversation {} ({} words) as {}",
            format!("#{}", record.number).bold(),
            record.word_count,
            record.id
        );
    }

    match outcome.error {
        Some(error) => {
            eprintln!(
                "{} {} (partial transcript was saved)",
                "Recording ended early:".red().bold(),
                error
            );
            Err(error)
        }
        None => Ok(()),
    }
}

fn print_report(number: u64, report: &MedicalReport) {
    println!(
        "{} for conversation #{} ({})",
        "MEDICAL REPORT".bold(),
        number,
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", "=".repeat(60));

    let sections = [
        ("Patient Details", &report.sections.patient_details),
        ("Chief Complaint", &report.sections.chief_complaint),
        ("Symptoms", &report.sections.symptoms),
        ("Medical History", &report.sections.medical_history),
        ("Physical Examination", &report.sections.physical_examination),
        ("Assessment", &report.sections.assessment),
        ("Plan", &report.sections.plan),
        ("Notes", &report.sections.notes),
    ];
    for (title, body) in sections {
        println!("\n{}", title.bold());
        println!("{}", body);
    }
}
