use shared::domain::{ButtonId, PendingInteraction, RequestId, UiButton};

/// A choice waiting for its y/N line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    request_id: RequestId,
    button_id: ButtonId,
}

/// What the console does with one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    Send(ButtonId),
    Confirm(String),
    Reject(String),
    Ignore,
}

/// Interprets a stdin line against the current prompt. A button carrying a
/// `confirm` spec needs a second, affirmative line; a confirmation is dropped
/// if the prompt was replaced in between.
pub fn interpret_line(
    pending: Option<&PendingInteraction>,
    confirming: &mut Option<Confirmation>,
    line: &str,
) -> LineAction {
    let open = confirming.take();
    let Some(pending) = pending else {
        return if line.trim().is_empty() {
            LineAction::Ignore
        } else {
            LineAction::Reject("nothing to answer right now".into())
        };
    };

    if let Some(open) = open {
        if open.request_id != pending.request_id {
            return LineAction::Reject(format!("prompt changed; {}", choice_hint(pending)));
        }
        if is_affirmative(line) {
            return LineAction::Send(open.button_id);
        }
        return LineAction::Reject(format!("not sent; {}", choice_hint(pending)));
    }

    let Some(button) = resolve_choice(pending, line) else {
        return LineAction::Reject(format!(
            "not a choice: {:?}; {}",
            line.trim(),
            choice_hint(pending)
        ));
    };
    match &button.confirm {
        Some(confirm) => {
            *confirming = Some(Confirmation {
                request_id: pending.request_id.clone(),
                button_id: button.id.clone(),
            });
            LineAction::Confirm(format!("{} [y/N]", confirm.title))
        }
        None => LineAction::Send(button.id.clone()),
    }
}

/// Maps a typed line onto one of the pending request's buttons, either by its
/// 1-based position or by its id.
pub fn resolve_choice<'a>(pending: &'a PendingInteraction, input: &str) -> Option<&'a UiButton> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(index) = input.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|index| pending.ui.buttons.get(index));
    }
    pending.ui.button(&ButtonId::from(input))
}

pub fn choice_hint(pending: &PendingInteraction) -> String {
    let ids: Vec<&str> = pending
        .ui
        .buttons
        .iter()
        .map(|button| button.id.as_str())
        .collect();
    format!(
        "choose 1-{} or one of [{}], Ctrl-C cancels the run",
        pending.ui.buttons.len(),
        ids.join(", ")
    )
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
