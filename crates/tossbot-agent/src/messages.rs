//! Reply templates. All user-facing text lives here.

use tossbot_engine::RefreshOutcome;
use tossbot_chain::MonitoredWallet;
use tossbot_types::{Toss, TossError, TossResult, TossStatus, UNKNOWN_OPTION};

pub fn help_text(prefix: &str) -> String {
    format!(
        "I run wagers in this chat. Commands:\n\
         {prefix} <topic> [A vs B] [for <stake>] — start a toss (groups only)\n\
         {prefix} status — show the current toss\n\
         {prefix} join — resend the payment buttons\n\
         {prefix} close <option> — declare the winner (creator only)\n\
         {prefix} close — cancel and refund everyone (creator only)\n\
         {prefix} refresh — reconcile the escrow balance\n\
         {prefix} balance — your wallet balance (DM only)\n\
         {prefix} monitor — watcher status (DM only)"
    )
}

pub fn toss_created(toss: &Toss) -> String {
    format!(
        "Toss #{} is on: \"{}\"\n\
         Options: {} or {} — stake {} each.\n\
         Tap a button below to stake and pick your side.",
        toss.id,
        toss.topic,
        toss.options[0],
        toss.options[1],
        toss.stake.to_display_string(),
    )
}

pub fn payment_button_description(toss: &Toss, option: &str) -> String {
    format!(
        "Join toss #{} \"{}\" with {} ({})",
        toss.id,
        toss.topic,
        option,
        toss.stake.to_display_string()
    )
}

pub fn joined(toss: &Toss, user: &str, option: &str) -> String {
    format!(
        "{} is in on \"{}\" with {} — {} playing, pot {}.",
        user,
        toss.topic,
        option,
        toss.participants.len(),
        toss.pot().to_display_string(),
    )
}

pub fn status(toss: &Toss) -> String {
    let mut lines = vec![format!(
        "Toss #{} \"{}\" — {} — stake {}",
        toss.id,
        toss.topic,
        status_label(toss.status),
        toss.stake.to_display_string(),
    )];

    let tallies = toss.tallies();
    lines.push(format!(
        "{}: {} — {}: {}",
        toss.options[0], tallies[0], toss.options[1], tallies[1]
    ));

    if toss.participants.is_empty() {
        lines.push("No players yet.".to_string());
    } else {
        for (index, pick) in toss.participant_options.iter().enumerate() {
            let option = if pick.option == UNKNOWN_OPTION { "option unknown" } else { &pick.option };
            lines.push(format!("P{}: {} ({})", index + 1, pick.user_id, option));
        }
    }

    if let Some(result) = &toss.result {
        lines.push(match result {
            TossResult::Won(option) => format!("Result: {option}"),
            TossResult::ForceClosed => "Result: cancelled, stakes refunded".to_string(),
        });
    }
    lines.join("\n")
}

fn status_label(status: TossStatus) -> &'static str {
    match status {
        TossStatus::Created => "open",
        TossStatus::WaitingForPlayer => "open",
        TossStatus::InProgress => "closing",
        TossStatus::Completed => "completed",
        TossStatus::Cancelled => "cancelled",
    }
}

pub fn closed_summary(toss: &Toss) -> String {
    let winning = match &toss.result {
        Some(TossResult::Won(option)) => option.as_str(),
        _ => "?",
    };
    let winners = toss.winners_of(winning);
    let mut out = if winners.is_empty() {
        format!("Toss #{} closed: \"{}\" — nobody picked {}.", toss.id, toss.topic, winning)
    } else {
        let prize = toss
            .pot()
            .checked_div(winners.len() as u64)
            .map(|a| a.to_display_string())
            .unwrap_or_default();
        format!(
            "Toss #{} closed: {} wins! {} winner(s) get {} each.",
            toss.id,
            winning,
            winners.len(),
            prize,
        )
    };
    if let Some(link) = &toss.tx_link {
        out.push_str(&format!("\nPayout: {link}"));
    }
    if !toss.failed_winners.is_empty() {
        out.push_str(&format!(
            "\nCould not pay: {} — contact the operator.",
            join_ids(&toss.failed_winners)
        ));
    }
    out
}

pub fn force_closed_summary(toss: &Toss) -> String {
    let mut out = format!(
        "Toss #{} cancelled. {} stake(s) of {} refunded.",
        toss.id,
        toss.participants.len() - toss.failed_refunds.len(),
        toss.stake.to_display_string(),
    );
    if let Some(link) = &toss.tx_link {
        out.push_str(&format!("\nRefund: {link}"));
    }
    if !toss.failed_refunds.is_empty() {
        out.push_str(&format!(
            "\nCould not refund: {} — contact the operator.",
            join_ids(&toss.failed_refunds)
        ));
    }
    out
}

pub fn refresh_summary(outcome: &RefreshOutcome) -> String {
    let mut out = format!(
        "Escrow holds {}, {} expected for {} recorded player(s).",
        outcome.escrow_balance.to_display_string(),
        outcome.expected_balance.to_display_string(),
        outcome.toss.participants.len() - outcome.unknown_added,
    );
    if outcome.unknown_added > 0 {
        out.push_str(&format!(
            "\nFound {} paid-in player(s) I could not identify; their option is marked unknown. \
             Creator, please sort them out before closing.",
            outcome.unknown_added
        ));
    } else {
        out.push_str("\nEverything adds up.");
    }
    out
}

pub fn monitor_summary(running: bool, wallets: &[MonitoredWallet]) -> String {
    let mut lines = vec![format!(
        "Watcher: {} — {} wallet(s) monitored.",
        if running { "running" } else { "stopped" },
        wallets.len()
    )];
    for wallet in wallets {
        let checkpoint = wallet
            .last_scanned_block
            .map(|b| format!("block {b}"))
            .unwrap_or_else(|| "no scan yet".to_string());
        lines.push(format!("toss #{}: {} ({})", wallet.toss_id, wallet.address, checkpoint));
    }
    lines.join("\n")
}

pub fn unresolved_option(toss: &Toss) -> String {
    format!(
        "I received your payment but could not tell which option it was for. \
         Options are {} or {} — please resend using the payment buttons.",
        toss.options[0], toss.options[1],
    )
}

pub fn groups_only() -> String {
    "Tosses are only supported in group chats.".to_string()
}

pub fn dm_only() -> String {
    "That command only works in a DM with me.".to_string()
}

pub fn no_active_toss(prefix: &str) -> String {
    format!("No toss is running here. Start one with {prefix} <topic>.")
}

pub fn error_reply(error: &TossError) -> String {
    if error.is_user_visible() {
        error.to_string()
    } else {
        "Something went wrong on my side; please try again shortly.".to_string()
    }
}

fn join_ids(ids: &[tossbot_types::UserId]) -> String {
    ids.iter().map(|u| u.as_str()).collect::<Vec<_>>().join(", ")
}
