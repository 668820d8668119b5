//! In-memory fake backend shared by the runtime integration tests
//!
//! Keeps groups and members in memory, answers the request/reply addresses,
//! applies fire-and-forget mutations and pushes `{"update":"now"}` on the
//! group topic to every attached client, like the real backend does.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nayouchi_core::{
    duplicates_among, nominations_per_member, Address, DuplicateScope, Member, Name, Nomination,
    Role, Topic,
};
use nayouchi_runtime::{
    AppContext, MemoryChannel, MemoryReply, ParticipantId, SessionConfig, SharedChannel,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct MemberRecord {
    participant: String,
    name: String,
    role: Role,
    nominations: Vec<Name>,
}

#[derive(Debug, Clone)]
struct GroupRecord {
    name: String,
    members: Vec<MemberRecord>,
}

#[derive(Default)]
struct State {
    groups: Vec<(String, GroupRecord)>,
    next_id: u32,
}

/// Shared backend answering any number of [`MemoryChannel`] clients
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
    clients: Arc<Mutex<Vec<MemoryChannel>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group directly, with `(participant, display name, role)` members
    pub fn seed_group(&self, id: &str, name: &str, members: &[(&str, &str, Role)]) {
        let record = GroupRecord {
            name: name.to_string(),
            members: members
                .iter()
                .map(|(participant, name, role)| MemberRecord {
                    participant: participant.to_string(),
                    name: name.to_string(),
                    role: *role,
                    nominations: Vec::new(),
                })
                .collect(),
        };
        self.state.lock().unwrap().groups.push((id.to_string(), record));
    }

    /// Open a client channel wired to this backend
    pub fn client(&self) -> MemoryChannel {
        let backend = self.clone();
        let channel = MemoryChannel::open_with(move |address, body| backend.handle(address, body));
        self.clients.lock().unwrap().push(channel.clone());
        channel
    }

    /// Start a session for `participant` on a fresh client channel
    pub async fn context(&self, participant: &str) -> (AppContext, MemoryChannel) {
        let channel = self.client();
        let shared: SharedChannel = Arc::new(channel.clone());
        let context = AppContext::builder(ParticipantId::new(participant))
            .with_channel(shared)
            .with_session_config(SessionConfig {
                request_timeout: Some(Duration::from_secs(2)),
                ..SessionConfig::default()
            })
            .connect_timeout(Duration::from_secs(1))
            .build_and_start()
            .await
            .expect("session should start");
        (context, channel)
    }

    fn handle(&self, address: Address, body: &Value) -> MemoryReply {
        let usr = body["usr"].as_str().unwrap_or_default().to_string();
        let grp = body["grp"].as_str().unwrap_or_default().to_string();

        let reply = {
            let mut state = self.state.lock().unwrap();
            match address {
                Address::List => json!(state
                    .groups
                    .iter()
                    .filter(|(_, g)| g.members.iter().any(|m| m.participant == usr))
                    .map(|(id, g)| summary(id, g, &usr))
                    .collect::<Vec<_>>()),
                Address::Enter => match state.groups.iter().find(|(id, _)| *id == grp) {
                    Some((id, g)) => snapshot(id, g, &usr),
                    None => return MemoryReply::Value(json!(null)),
                },
                Address::Create => {
                    state.next_id += 1;
                    let id = format!("new{}", state.next_id);
                    state.groups.push((
                        id.clone(),
                        GroupRecord {
                            name: body["name"].as_str().unwrap_or_default().to_string(),
                            members: vec![MemberRecord {
                                participant: usr.clone(),
                                name: String::new(),
                                role: Role::Initiator,
                                nominations: Vec::new(),
                            }],
                        },
                    ));
                    json!({ "update": "now", "grp": id })
                }
                Address::ProposeName | Address::RemoveName | Address::SetUserName => {
                    let name = body["name"].as_str().unwrap_or_default().to_string();
                    if let Some(member) = member_mut(&mut state, &grp, &usr) {
                        match address {
                            Address::ProposeName => {
                                if !member.nominations.iter().any(|n| n.as_str() == name) {
                                    member.nominations.push(Name::new(name));
                                }
                            }
                            Address::RemoveName => member.nominations.retain(|n| n.as_str() != name),
                            _ => member.name = name,
                        }
                    }
                    json!({ "result": "success" })
                }
                Address::Upgrade => {
                    let target = body["member"].as_str().unwrap_or_default().to_string();
                    if let Some((_, g)) = state.groups.iter_mut().find(|(id, _)| *id == grp) {
                        for m in g.members.iter_mut().filter(|m| m.name == target) {
                            m.role = Role::Initiator;
                        }
                    }
                    json!({ "result": "success" })
                }
                Address::Resign => {
                    let mut removed = false;
                    if let Some(pos) = state.groups.iter().position(|(id, _)| *id == grp) {
                        let group = &mut state.groups[pos].1;
                        group.members.retain(|m| m.participant != usr);
                        if group.members.is_empty() {
                            state.groups.remove(pos);
                            removed = true;
                        }
                    }
                    // the backend answers resign with a string-encoded document
                    Value::String(
                        json!({ "group": if removed { "removed" } else { "updated" } }).to_string(),
                    )
                }
                Address::AddMember | Address::Signup => json!({ "result": "success" }),
            }
        };

        if matches!(
            address,
            Address::ProposeName
                | Address::RemoveName
                | Address::SetUserName
                | Address::Upgrade
                | Address::Resign
        ) {
            self.notify(&grp);
        }
        MemoryReply::Value(reply)
    }

    fn notify(&self, group: &str) {
        let topic = Topic::new(format!("grp-{}", group));
        for client in self.clients.lock().unwrap().iter() {
            client.push(&topic, json!({ "update": "now" }));
        }
    }
}

fn member_mut<'a>(state: &'a mut State, grp: &str, usr: &str) -> Option<&'a mut MemberRecord> {
    state
        .groups
        .iter_mut()
        .find(|(id, _)| id == grp)
        .and_then(|(_, g)| g.members.iter_mut().find(|m| m.participant == usr))
}

fn me_of(group: &GroupRecord, usr: &str) -> Value {
    group
        .members
        .iter()
        .find(|m| m.participant == usr)
        .map(|m| json!({ "name": m.name, "role": m.role, "nominations": m.nominations }))
        .unwrap_or_else(|| json!({}))
}

fn summary(id: &str, group: &GroupRecord, usr: &str) -> Value {
    let others: Vec<Value> = group
        .members
        .iter()
        .filter(|m| m.participant != usr)
        .map(|m| json!({ "name": m.name, "role": m.role }))
        .collect();
    json!({ "id": id, "name": group.name, "me": me_of(group, usr), "others": others })
}

fn snapshot(id: &str, group: &GroupRecord, usr: &str) -> Value {
    let members: Vec<Member> = group
        .members
        .iter()
        .map(|m| Member {
            name: m.name.clone(),
            role: m.role,
            nominations: m.nominations.clone(),
        })
        .collect();
    let names_with = |role: Role| -> Vec<String> {
        group
            .members
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.name.clone())
            .collect()
    };
    let duplicates: Vec<Name> = duplicates_among(&members, DuplicateScope::InitiatorsOnly)
        .into_iter()
        .map(|r| r.name)
        .collect();
    let proposers_nominations: Vec<Name> = group
        .members
        .iter()
        .filter(|m| m.role == Role::Proposer)
        .flat_map(|m| m.nominations.clone())
        .collect();
    let nominations: Vec<Nomination> = group
        .members
        .iter()
        .flat_map(|m| m.nominations.iter().map(move |n| Nomination::new(n.clone(), m.name.clone())))
        .collect();
    let stats = nominations_per_member(&nominations);

    let mut snapshot = summary(id, group, usr);
    snapshot["initiators"] = json!(names_with(Role::Initiator));
    snapshot["proposers"] = json!(names_with(Role::Proposer));
    snapshot["duplicates"] = json!(duplicates);
    snapshot["proposersNominations"] = json!(proposers_nominations);
    snapshot["stats"] = json!(stats);
    snapshot
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
