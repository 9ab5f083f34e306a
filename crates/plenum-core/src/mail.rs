//! Signed, single-writer, append-only message streams between repositories.
//!
//! A stream from sender A to receiver B is a directory in A's public tree
//! holding numbered envelope files plus a `next.json` high-water mark. B
//! tracks its consumption cursor (and any rejection records) in B's own tree
//! under `mailbox/`. Directory names are blake3-derived keys of the receiver
//! address and the topic, so arbitrary topic strings cannot collide with or
//! escape the namespace.
//!
//! Ordering is strictly monotonic per (sender, topic); delivery is
//! at-most-once per sequence number. A failing envelope records one rejection
//! entry and halts the stream *before* the failure — the cursor never
//! advances past an unconsumed message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::canonical;
use crate::error::{GovError, Result};
use crate::identity::{self, SignedPlaintext};
use crate::journal::{ClonedOwner, ClonedRepo, Namespace, RepoAddress};

/// Position of an envelope in its stream.
pub type SeqNo = u64;

const NEXT_FILE: &str = "next.json";
const REJECTED_DIR: &str = "rejected";

/// The signed unit travelling in a stream file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Sequence number, also the file name.
    pub seq: SeqNo,
    /// Opaque topic string, e.g. `ballot/pp/c1`.
    pub topic: String,
    /// Serialized request payload.
    pub payload: Value,
}

/// A rejection record left in the receiver's mailbox.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rejection {
    /// Sequence number of the rejected envelope.
    pub seq: SeqNo,
    /// Why it was rejected.
    pub reason: String,
}

fn key_segment(text: &str) -> String {
    hex::encode(&blake3::hash(text.as_bytes()).as_bytes()[..8])
}

/// Stream directory in the *sender's* public tree.
pub fn stream_ns(receiver: &RepoAddress, topic: &str) -> Namespace {
    Namespace::new(["mail"])
        .join(key_segment(receiver.as_str()))
        .join(key_segment(topic))
}

/// Cursor directory in the *receiver's* tree.
pub fn mailbox_ns(sender: &RepoAddress, topic: &str) -> Namespace {
    Namespace::new(["mailbox"])
        .join(key_segment(sender.as_str()))
        .join(key_segment(topic))
}

/// Appends a signed envelope to the sender's stream toward `receiver`.
///
/// Returns the assigned sequence number. Nothing is committed.
pub fn send_signed_staged<T: Serialize>(
    cx: &CancelToken,
    sender: &ClonedOwner,
    receiver: &RepoAddress,
    topic: &str,
    payload: &T,
) -> Result<SeqNo> {
    cx.check()?;
    let stream = stream_ns(receiver, topic);
    let seq = read_seq_or_zero(&sender.public, &stream.join(NEXT_FILE))?;
    let envelope = Envelope {
        seq,
        topic: topic.to_string(),
        payload: serde_json::to_value(payload)?,
    };
    let credentials = identity::private_credentials(&sender.private)?;
    let signed = credentials.sign(canonical::to_string(&envelope)?)?;
    sender
        .public
        .write_json_staged(&stream.join(format!("{seq}.json")), &signed)?;
    sender
        .public
        .write_json_staged(&stream.join(NEXT_FILE), &(seq + 1))?;
    tracing::debug!(receiver = %receiver, topic, seq, "staged outgoing envelope");
    Ok(seq)
}

/// Pulls unread envelopes from `sender_tree`, verifying each signature
/// against the sender's published credentials and handing the decoded
/// payload to `respond`.
///
/// Successful envelopes advance the receiver's cursor one by one; the first
/// failure records a [`Rejection`] (once) and stops, leaving the cursor on
/// the failing message. Cancellation, I/O and remote errors propagate
/// instead of being recorded.
pub fn receive_signed_staged<T, R>(
    cx: &CancelToken,
    receiver: &ClonedRepo,
    sender_addr: &RepoAddress,
    sender_tree: &ClonedRepo,
    topic: &str,
    mut respond: impl FnMut(SeqNo, T) -> Result<R>,
) -> Result<Vec<(SeqNo, R)>>
where
    T: DeserializeOwned,
{
    cx.check()?;
    let stream = stream_ns(receiver.address(), topic);
    let mailbox = mailbox_ns(sender_addr, topic);
    let sender_next = read_seq_or_zero(sender_tree, &stream.join(NEXT_FILE))?;
    let mut cursor = read_seq_or_zero(receiver, &mailbox.join(NEXT_FILE))?;
    let sender_credentials = match identity::public_credentials(sender_tree) {
        Ok(credentials) => credentials,
        Err(err) if err.is_not_exist() && cursor == sender_next => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut received = Vec::new();
    while cursor < sender_next {
        cx.check()?;
        let seq = cursor;
        match consume_one(sender_tree, &stream, &sender_credentials, topic, seq, &mut respond) {
            Ok(response) => {
                received.push((seq, response));
                cursor += 1;
                receiver.write_json_staged(&mailbox.join(NEXT_FILE), &cursor)?;
            }
            Err(err @ (GovError::Cancelled | GovError::Io(_) | GovError::Remote { .. })) => {
                return Err(err);
            }
            Err(err) => {
                let rejection_ns = mailbox.join(REJECTED_DIR).join(format!("{seq}.json"));
                if !receiver.exists(&rejection_ns) {
                    receiver.write_json_staged(
                        &rejection_ns,
                        &Rejection {
                            seq,
                            reason: err.to_string(),
                        },
                    )?;
                }
                tracing::warn!(sender = %sender_addr, topic, seq, error = %err, "rejected envelope; stream halted");
                break;
            }
        }
    }
    Ok(received)
}

fn consume_one<T, R>(
    sender_tree: &ClonedRepo,
    stream: &Namespace,
    sender_credentials: &identity::PublicCredentials,
    topic: &str,
    seq: SeqNo,
    respond: &mut impl FnMut(SeqNo, T) -> Result<R>,
) -> Result<R>
where
    T: DeserializeOwned,
{
    let signed: SignedPlaintext = sender_tree.read_json(&stream.join(format!("{seq}.json")))?;
    signed.verify(sender_credentials)?;
    let envelope: Envelope = canonical::from_slice(signed.payload.as_bytes())?;
    if envelope.seq != seq || envelope.topic != topic {
        return Err(GovError::signature(format!(
            "envelope metadata mismatch: expected seq {seq} topic {topic}, got seq {} topic {}",
            envelope.seq, envelope.topic
        )));
    }
    let payload: T = serde_json::from_value(envelope.payload)?;
    respond(seq, payload)
}

/// Reads back every envelope payload the sender has staged or committed in
/// its own stream toward `receiver`, in sequence order.
///
/// Used by senders auditing their own outbox (e.g. vote tracking).
pub fn sent_payloads<T: DeserializeOwned>(
    sender_public: &ClonedRepo,
    receiver: &RepoAddress,
    topic: &str,
) -> Result<Vec<(SeqNo, T)>> {
    let stream = stream_ns(receiver, topic);
    let mut out = Vec::new();
    for name in sender_public.list(&stream)? {
        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        let Ok(seq) = stem.parse::<SeqNo>() else {
            continue;
        };
        let signed: SignedPlaintext = sender_public.read_json(&stream.join(&name))?;
        let envelope: Envelope = canonical::from_slice(signed.payload.as_bytes())?;
        let payload: T = serde_json::from_value(envelope.payload)?;
        out.push((seq, payload));
    }
    out.sort_by_key(|(seq, _)| *seq);
    Ok(out)
}

fn read_seq_or_zero(tree: &ClonedRepo, ns: &Namespace) -> Result<SeqNo> {
    match tree.read_json(ns) {
        Ok(seq) => Ok(seq),
        Err(err) if err.is_not_exist() => Ok(0),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use tempfile::TempDir;

    use super::{mailbox_ns, receive_signed_staged, send_signed_staged, sent_payloads};
    use crate::cancel::CancelToken;
    use crate::identity;
    use crate::journal::{ClonedOwner, ClonedRepo, OwnerAddress, RepoAddress};

    fn bare_remote(root: &Path, name: &str) -> RepoAddress {
        let path = root.join(name);
        std::fs::create_dir_all(&path).unwrap();
        let status = Command::new("git")
            .current_dir(&path)
            .args(["init", "--bare", "--quiet", "-b", "main", "."])
            .status()
            .unwrap();
        assert!(status.success());
        RepoAddress::new(path.to_string_lossy())
    }

    fn owner(root: &Path, name: &str) -> (OwnerAddress, ClonedOwner) {
        let cx = CancelToken::new();
        let address = OwnerAddress {
            public: bare_remote(root, &format!("{name}-public.git")),
            private: bare_remote(root, &format!("{name}-private.git")),
        };
        let cloned = ClonedOwner::clone(&cx, &address).unwrap();
        identity::init_staged(&cloned).unwrap();
        (address, cloned)
    }

    fn gov_tree(root: &Path) -> ClonedRepo {
        let address = bare_remote(root, "gov-public.git");
        ClonedRepo::clone(&CancelToken::new(), &address).unwrap()
    }

    #[test]
    fn send_receive_preserves_order_and_consumes_once() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let (sender_addr, sender) = owner(root.path(), "alice");
        let receiver = gov_tree(root.path());

        let topic = "test/topic";
        for n in 0..3u64 {
            let seq =
                send_signed_staged(&cx, &sender, receiver.address(), topic, &format!("m{n}"))
                    .unwrap();
            assert_eq!(seq, n);
        }

        let mut seen = Vec::new();
        let received = receive_signed_staged(
            &cx,
            &receiver,
            &sender_addr.public,
            &sender.public,
            topic,
            |seq, payload: String| {
                seen.push((seq, payload));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(
            seen,
            vec![
                (0, "m0".to_string()),
                (1, "m1".to_string()),
                (2, "m2".to_string())
            ]
        );

        // Second receive: nothing new, nothing re-delivered.
        let again = receive_signed_staged(
            &cx,
            &receiver,
            &sender_addr.public,
            &sender.public,
            topic,
            |_, _: String| -> crate::Result<()> { panic!("redelivered") },
        )
        .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn failing_envelope_halts_stream_with_one_rejection() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let (sender_addr, sender) = owner(root.path(), "alice");
        let receiver = gov_tree(root.path());
        let topic = "test/topic";

        for n in 0..3u64 {
            send_signed_staged(&cx, &sender, receiver.address(), topic, &format!("m{n}")).unwrap();
        }

        let received = receive_signed_staged(
            &cx,
            &receiver,
            &sender_addr.public,
            &sender.public,
            topic,
            |seq, payload: String| {
                if seq == 1 {
                    Err(crate::GovError::invariant("bad payload"))
                } else {
                    Ok(payload)
                }
            },
        )
        .unwrap();
        // Only the first message got through; the cursor stops on seq 1.
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, 0);

        let mailbox = mailbox_ns(&sender_addr.public, topic);
        assert!(receiver.exists(&mailbox.join("rejected").join("1.json")));

        // Re-receiving retries the failing message, not the consumed one.
        let retried = receive_signed_staged(
            &cx,
            &receiver,
            &sender_addr.public,
            &sender.public,
            topic,
            |_, payload: String| Ok(payload),
        )
        .unwrap();
        assert_eq!(
            retried.iter().map(|(seq, _)| *seq).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn tampered_envelope_is_rejected() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let (sender_addr, sender) = owner(root.path(), "alice");
        let (_, mallory) = owner(root.path(), "mallory");
        let receiver = gov_tree(root.path());
        let topic = "test/topic";

        // Mallory writes into her own tree but claims alice's stream layout;
        // grafting her file into alice's stream must fail verification
        // because the key in the envelope is not alice's published key.
        send_signed_staged(&cx, &mallory, receiver.address(), topic, &"forged").unwrap();
        let stream = super::stream_ns(receiver.address(), topic);
        let forged = mallory.public.read(&stream.join("0.json")).unwrap();
        sender.public.write_staged(&stream.join("0.json"), &forged).unwrap();
        sender
            .public
            .write_json_staged(&stream.join("next.json"), &1u64)
            .unwrap();

        let received = receive_signed_staged(
            &cx,
            &receiver,
            &sender_addr.public,
            &sender.public,
            topic,
            |_, payload: String| Ok(payload),
        )
        .unwrap();
        assert!(received.is_empty());
        let mailbox = mailbox_ns(&sender_addr.public, topic);
        assert!(receiver.exists(&mailbox.join("rejected").join("0.json")));
    }

    #[test]
    fn sent_payloads_reads_back_own_stream() {
        let cx = CancelToken::new();
        let root = TempDir::new().unwrap();
        let (_, sender) = owner(root.path(), "alice");
        let receiver = gov_tree(root.path());
        let topic = "test/topic";

        send_signed_staged(&cx, &sender, receiver.address(), topic, &"a").unwrap();
        send_signed_staged(&cx, &sender, receiver.address(), topic, &"b").unwrap();

        let sent: Vec<(u64, String)> =
            sent_payloads(&sender.public, receiver.address(), topic).unwrap();
        assert_eq!(sent, vec![(0, "a".to_string()), (1, "b".to_string())]);
    }
}
