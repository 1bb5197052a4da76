use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::info;

use crate::loader::Loader;
use crate::model::Message;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplInput<'a> {
    Exit,
    Clear,
    History,
    Empty,
    Prompt(&'a str),
}

fn classify_input(line: &str) -> ReplInput<'_> {
    let prompt = line.trim();
    if prompt.is_empty() {
        return ReplInput::Empty;
    }
    if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
        return ReplInput::Exit;
    }
    if prompt.eq_ignore_ascii_case("clear") || prompt.eq_ignore_ascii_case("/clear") {
        return ReplInput::Clear;
    }
    if prompt.eq_ignore_ascii_case("/history") {
        return ReplInput::History;
    }
    ReplInput::Prompt(prompt)
}

/// Runs the interactive loop until `exit`, `quit` or end of input.
///
/// Provider errors are printed and the loop keeps going; only I/O failures
/// on `input` or `output` end it with an error.
pub async fn run_repl<R, W>(
    session: &mut Session<'_>,
    mut input: R,
    output: &mut W,
    show_progress: bool,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    writeln!(
        output,
        "Starting interactive chat mode with {} (type 'exit' to quit)",
        session.provider().name()
    )?;
    writeln!(output, "Model: {}", session.options().model)?;

    loop {
        write!(output, "\nYou: ")?;
        output.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read stdin")?;
        if read == 0 {
            writeln!(output)?;
            break;
        }

        match classify_input(&line) {
            ReplInput::Empty => continue,
            ReplInput::Exit => break,
            ReplInput::Clear => {
                session.clear();
                writeln!(output, "conversation cleared")?;
            }
            ReplInput::History => print_history(output, session.history())?,
            ReplInput::Prompt(prompt) => {
                exchange(session, prompt, output, show_progress).await?;
            }
        }
    }

    info!("interactive session ended");
    Ok(())
}

async fn exchange<W: Write>(
    session: &mut Session<'_>,
    prompt: &str,
    output: &mut W,
    show_progress: bool,
) -> Result<()> {
    let mut loader = show_progress.then(|| Loader::start("thinking"));
    let mut started = false;
    let mut write_err: Option<io::Error> = None;

    let result = session
        .send(prompt, &mut |delta: &str| {
            if let Some(loader) = loader.take() {
                loader.stop();
            }
            let written = if started {
                write!(output, "{delta}")
            } else {
                started = true;
                write!(output, "\nAssistant: {delta}")
            };
            if let Err(err) = written.and_then(|()| output.flush()) {
                write_err.get_or_insert(err);
            }
        })
        .await;

    if let Some(loader) = loader.take() {
        loader.stop();
    }
    if let Some(err) = write_err {
        return Err(err).context("Failed to write reply");
    }

    match result {
        Ok(_) => writeln!(output)?,
        Err(err) => writeln!(output, "\nError: {err}")?,
    }
    Ok(())
}

fn print_history<W: Write>(output: &mut W, history: &[Message]) -> io::Result<()> {
    if history.is_empty() {
        return writeln!(output, "(history is empty)");
    }

    for (idx, msg) in history.iter().enumerate() {
        writeln!(output, "[{}] {}: {}", idx, msg.role.as_str(), msg.content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::{ReplInput, classify_input, run_repl};
    use crate::error::ProviderError;
    use crate::model::{CompletionOptions, Message, ModelInfo};
    use crate::providers::{DeltaSink, Provider, ProviderFuture};
    use crate::session::{Conversation, Session};

    /// Answers "ok:<prompt>" in two deltas; prompts starting with "fail"
    /// produce a request error.
    struct ScriptProvider {
        calls: Mutex<Vec<usize>>,
    }

    impl Provider for ScriptProvider {
        fn stream_completion<'a>(
            &'a self,
            messages: &'a [Message],
            _options: &'a CompletionOptions,
            on_delta: DeltaSink<'a>,
        ) -> ProviderFuture<'a, ()> {
            Box::pin(async move {
                self.calls.lock().expect("lock").push(messages.len());
                let prompt = messages.last().map(|msg| msg.content.as_str()).unwrap_or("");
                if prompt.starts_with("fail") {
                    return Err(ProviderError::RequestFailed {
                        status: 500,
                        body: "boom".to_string(),
                    });
                }
                on_delta("ok:");
                on_delta(prompt);
                Ok(())
            })
        }

        fn list_models<'a>(&'a self) -> ProviderFuture<'a, Vec<ModelInfo>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn default_model(&self) -> &'static str {
            "script"
        }

        fn name(&self) -> &'static str {
            "Script"
        }

        fn description(&self) -> &'static str {
            "scripted replies"
        }
    }

    async fn run_script(script: &str, system: Option<&str>) -> (String, Vec<Message>, Vec<usize>) {
        let provider = ScriptProvider {
            calls: Mutex::new(Vec::new()),
        };
        let mut session = Session::new(
            &provider,
            CompletionOptions::new("script", 0.7).streaming(true),
            Conversation::new(system.map(str::to_string), 0),
        );
        let mut output = Vec::new();

        run_repl(&mut session, Cursor::new(script.to_string()), &mut output, false)
            .await
            .expect("repl should finish");

        let history = session.history().to_vec();
        let calls = provider.calls.lock().expect("lock").clone();
        (String::from_utf8(output).expect("utf8"), history, calls)
    }

    #[test]
    fn classify_input_recognizes_keywords() {
        assert_eq!(classify_input("  EXIT \n"), ReplInput::Exit);
        assert_eq!(classify_input("Quit"), ReplInput::Exit);
        assert_eq!(classify_input("clear"), ReplInput::Clear);
        assert_eq!(classify_input("/CLEAR"), ReplInput::Clear);
        assert_eq!(classify_input("/history"), ReplInput::History);
        assert_eq!(classify_input(" \t\n"), ReplInput::Empty);
        assert_eq!(classify_input(" exit now \n"), ReplInput::Prompt("exit now"));
    }

    #[tokio::test]
    async fn streams_replies_and_stops_at_exit() {
        let (output, history, calls) = run_script("hello\n\nexit\nnever sent\n", None).await;

        assert!(output.contains("Starting interactive chat mode with Script"));
        assert!(output.contains("Model: script"));
        assert!(output.contains("Assistant: ok:hello"), "output: {output}");
        assert!(!output.contains("never sent"));
        assert_eq!(calls, vec![1]);
        assert_eq!(
            history,
            vec![Message::user("hello"), Message::assistant("ok:hello")]
        );
    }

    #[tokio::test]
    async fn errors_are_reported_and_loop_continues() {
        let (output, history, calls) = run_script("fail please\nagain\n", None).await;

        assert!(
            output.contains("Error: request failed (status 500): boom"),
            "output: {output}"
        );
        assert!(output.contains("Assistant: ok:again"), "output: {output}");
        assert_eq!(calls, vec![1, 1]);
        assert_eq!(
            history,
            vec![Message::user("again"), Message::assistant("ok:again")]
        );
    }

    #[tokio::test]
    async fn clear_resets_to_system_prompt() {
        let (output, history, calls) = run_script("one\nclear\ntwo\n", Some("sys")).await;

        assert!(output.contains("conversation cleared"));
        assert_eq!(calls, vec![2, 2]);
        assert_eq!(
            history,
            vec![
                Message::system("sys"),
                Message::user("two"),
                Message::assistant("ok:two"),
            ]
        );
    }

    #[tokio::test]
    async fn history_command_lists_messages() {
        let (output, _, _) = run_script("hi\n/history\nquit\n", Some("sys")).await;

        assert!(output.contains("[0] system: sys"), "output: {output}");
        assert!(output.contains("[1] user: hi"), "output: {output}");
        assert!(output.contains("[2] assistant: ok:hi"), "output: {output}");
    }

    #[tokio::test]
    async fn end_of_input_ends_session_cleanly() {
        let (output, history, calls) = run_script("", None).await;

        assert!(output.ends_with("You: \n"), "output: {output:?}");
        assert!(history.is_empty());
        assert!(calls.is_empty());
    }
}
