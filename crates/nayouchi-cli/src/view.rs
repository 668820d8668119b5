//! Plain-text rendering of session state

use std::fmt::Write;

use nayouchi_core::{as_key_value_list, Group, GroupSummary, Role};
use nayouchi_runtime::{SessionPhase, SessionSnapshot};

/// Render the group list with the indices `enter` accepts
pub fn render_group_list(groups: &[GroupSummary]) -> String {
    if groups.is_empty() {
        return "No groups yet. Use `create <name>` to start one.\n".to_string();
    }

    let mut out = String::from("Your groups:\n");
    for (index, group) in groups.iter().enumerate() {
        let others: Vec<&str> = group.others.iter().map(|m| m.name.as_str()).collect();
        let _ = write!(out, "  [{}] {} ({})", index + 1, group.name, group.me.role);
        if !others.is_empty() {
            let _ = write!(out, " with {}", others.join(", "));
        }
        out.push('\n');
    }
    out
}

/// Render the current group: members, own nominations, matches and stats
pub fn render_group(group: &Group, show_stats: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", group.name);

    let me = if group.needs_name() {
        "(no name yet)"
    } else {
        group.me.name.as_str()
    };
    let _ = writeln!(out, "You: {} [{}]", me, group.me.role);
    let _ = writeln!(out, "Initiators: {}", join_or_dash(&group.initiators));
    let _ = writeln!(out, "Proposers: {}", join_or_dash(&group.proposers));

    let mine: Vec<String> = group
        .my_nominations()
        .iter()
        .map(|name| {
            if group.is_match(name) {
                format!("{} *", name)
            } else {
                name.to_string()
            }
        })
        .collect();
    let _ = writeln!(out, "Your names: {}", join_or_dash(&mine));

    let matches: Vec<String> = group.duplicates.iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "Matches: {}", join_or_dash(&matches));

    if group.me.role == Role::Initiator && !group.proposers_nominations.is_empty() {
        let proposed: Vec<String> = group
            .proposers_nominations
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = writeln!(out, "Proposed by others: {}", proposed.join(", "));
    }

    if show_stats && !group.stats.is_empty() {
        let stats: Vec<String> = as_key_value_list(&group.stats)
            .into_iter()
            .map(|entry| format!("{}: {}", display_member(&entry.key), entry.value))
            .collect();
        let _ = writeln!(out, "Names per member: {}", stats.join(", "));
    }

    out
}

/// Full view for a snapshot, dispatching on the phase
pub fn render_snapshot(snapshot: &SessionSnapshot, show_stats: bool) -> String {
    match (&snapshot.phase, &snapshot.group, &snapshot.groups) {
        (SessionPhase::Unidentified, _, _) => "Connecting...\n".to_string(),
        (SessionPhase::Naming, Some(group), _) => {
            let mut out = render_group(group, show_stats);
            out.push_str("Pick a display name with `name <your name>` before proposing.\n");
            out
        }
        (_, Some(group), _) => render_group(group, show_stats),
        (_, None, Some(groups)) => render_group_list(groups),
        (_, None, None) => "Loading groups...\n".to_string(),
    }
}

pub fn help_text() -> &'static str {
    "Commands:
  list                 show your groups
  create <name>        create a group and enter it
  enter <n|id>         enter a group by list index or id
  leave                back to the group list
  name [display name]  set your display name in this group
  propose <name>       nominate a name
  remove <name>        withdraw a nomination
  invite <email>       add a member by mail
  upgrade <member>     make a proposer an initiator
  resign               leave this group for good
  show                 redraw the current view
  help                 this text
  quit                 exit
"
}

fn join_or_dash<T: AsRef<str>>(items: &[T]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(|item| item.as_ref())
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

fn display_member(name: &str) -> &str {
    if name.trim().is_empty() {
        "(unnamed)"
    } else {
        name
    }
}
