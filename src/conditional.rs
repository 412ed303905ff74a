//! Lock token matching for the If: request header.
//!
//! The header parser ([`crate::davheaders::IfHeader`]) delivers the
//! condition groups; the functions here interpret the submitted lock
//! tokens against the locks a method needs, and evaluate the groups
//! afterwards. They are pure: annotated conditions go in and come back
//! out, nothing is flagged through a side channel.

use crate::davheaders::{IfItem, IfList};
use crate::davpath::DavPath;
use crate::ls::DavLock;

const OPAQUE_SCHEME: &str = "opaquelocktoken:";

// resolve a resource tag (plain path or absolute url) to a DavPath.
fn resource_tag_path(tag: &str, prefix: &str) -> Option<DavPath> {
    let path = if tag.starts_with('/') {
        tag.to_string()
    } else {
        url::Url::parse(tag).ok()?.path().to_string()
    };
    DavPath::from_str_and_prefix(&path, prefix).ok()
}

/// Match the submitted lock tokens against the locks `required` by the
/// request.
///
/// Every token that names a lock in the required set marks that lock as
/// covered (and the token as valid). A token that names no required lock
/// is checked against the locks at its own stated uri, so that a stale
/// or unrelated token does not fail the whole request.
///
/// Returns the annotated conditions, and the first still-uncovered
/// required lock if there is one.
pub(crate) fn verify_lock_tokens<F>(
    mut conditions: Vec<IfList>,
    mut required: Vec<DavLock>,
    request_path: &DavPath,
    prefix: &str,
    lookup: F,
) -> (Vec<IfList>, Result<(), DavLock>)
where
    F: Fn(&DavPath) -> Vec<DavLock>,
{
    for list in conditions.iter_mut() {
        let cond_path = match &list.resource_tag {
            Some(tag) => resource_tag_path(tag, prefix),
            None => Some(request_path.clone()),
        };
        for cond in list.conditions.iter_mut() {
            let IfItem::Token(token) = &cond.item else {
                continue;
            };
            if !token.starts_with(OPAQUE_SCHEME) {
                continue;
            }
            if let Some(pos) = required.iter().position(|l| l.uri_token() == *token) {
                cond.valid = true;
                required.remove(pos);
            } else if let Some(p) = &cond_path {
                // Leniency: the token is accepted when *any* lock lives at
                // its stated uri, without comparing the token itself.
                // TODO: ask product whether this should require an exact
                // token match; tightening it may break clients that submit
                // every token they hold.
                if !lookup(p).is_empty() {
                    cond.valid = true;
                }
            }
        }
    }
    let result = match required.into_iter().next() {
        Some(lock) => Err(lock),
        None => Ok(()),
    };
    (conditions, result)
}

/// A LOCK request has its own conflict handling; every submitted token
/// is provisionally taken at face value.
pub(crate) fn mark_all_tokens_valid(mut conditions: Vec<IfList>) -> Vec<IfList> {
    for list in conditions.iter_mut() {
        for cond in list.conditions.iter_mut() {
            if matches!(cond.item, IfItem::Token(_)) {
                cond.valid = true;
            }
        }
    }
    conditions
}

/// Evaluate the annotated condition groups (RFC4918 #10.4.3): the header
/// holds when at least one group holds, and a group holds when all of
/// its conditions do. Entity tag conditions are not evaluated here and
/// count as matched.
pub(crate) fn eval_if_lists(conditions: &[IfList]) -> bool {
    if conditions.is_empty() {
        return true;
    }
    conditions.iter().any(|list| {
        list.conditions.iter().all(|cond| match cond.item {
            IfItem::Token(_) => cond.valid != cond.negate,
            IfItem::ETag(_) => !cond.negate,
        })
    })
}
