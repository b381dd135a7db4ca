use std::{io::Write, str::FromStr};

use anyhow::Context;
use strum::{Display, EnumString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::email::{BatchDeleter, MailboxApi, SenderRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Decision {
    Yes,
    No,
    Quit,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionSummary {
    pub senders_reviewed: usize,
    pub senders_cleared: usize,
    pub messages_deleted: usize,
    /// Ids that could not be moved to the trash, across every sender.
    pub failed_ids: Vec<String>,
}

/// Offers each sender for deletion in the given order, reading one decision
/// per line from `input`. End of input stops the loop like `quit`.
pub async fn run<A, R, W>(
    api: &A,
    deleter: &BatchDeleter,
    senders: &[SenderRecord],
    input: R,
    output: &mut W,
) -> anyhow::Result<SelectionSummary>
where
    A: MailboxApi + ?Sized,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut summary = SelectionSummary::default();

    'senders: for (rank, sender) in senders.iter().enumerate() {
        writeln!(output, "{}. {} ({} emails)", rank + 1, sender.sender, sender.count)?;

        let decision = loop {
            write!(output, "Delete all emails from this sender? (yes/no/quit): ")?;
            output.flush()?;

            let Some(line) = lines.next_line().await.context("Cannot read answer")? else {
                writeln!(output)?;
                break 'senders;
            };
            match Decision::from_str(line.trim()) {
                Ok(decision) => break decision,
                Err(_) => writeln!(output, "Please answer yes, no or quit.")?,
            }
        };
        summary.senders_reviewed += 1;

        match decision {
            Decision::Yes => {
                let outcome = match deleter.delete_all(api, &sender.message_ids).await {
                    Ok(outcome) => {
                        summary.senders_cleared += 1;
                        outcome
                    }
                    Err(error) => error.into_outcome(),
                };
                summary.messages_deleted += outcome.succeeded;
                summary.failed_ids.extend(outcome.failed_ids());

                writeln!(output, "{}: {}", sender.sender, outcome)?;
                for failure in &outcome.failures {
                    writeln!(output, "  {}: {}", failure.message_id, failure.reason)?;
                }
            }
            Decision::No => continue,
            Decision::Quit => break,
        }
    }

    Ok(summary)
}
