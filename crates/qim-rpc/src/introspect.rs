//! Service introspection.
//!
//! Builds a [`ServiceDescription`] from a proxy's member list and per-member
//! overload metadata. Best effort: a member whose metadata cannot be fully
//! resolved is omitted, never fatal for the whole description. A member with
//! zero overloads is kept with an empty signature list.

use qim_core::{FunctionDescription, ServiceDescription, Signature};
use qim_session::{MemberMetadata, Overloads, ServiceProxy};
use tracing::debug;

/// What happened to one member during introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Metadata resolved completely.
    Described(FunctionDescription),
    /// Metadata missing or inconsistent; the member is left out.
    Omitted {
        /// Member name.
        member: String,
        /// Why it was left out.
        reason: String,
    },
}

/// Describe `proxy`, naming the result after `requested_name`.
///
/// Members appear in the proxy's enumeration order.
pub fn describe(proxy: &dyn ServiceProxy, requested_name: &str) -> ServiceDescription {
    let members = proxy.members();
    let functions: Vec<FunctionDescription> = members
        .iter()
        .filter_map(|member| match describe_member(proxy, member) {
            MemberOutcome::Described(function) => Some(function),
            MemberOutcome::Omitted { member, reason } => {
                debug!(service = requested_name, %member, %reason, "member omitted");
                None
            }
        })
        .collect();

    debug!(
        service = requested_name,
        members = members.len(),
        described = functions.len(),
        "service described"
    );

    ServiceDescription {
        name: requested_name.to_owned(),
        doc: proxy.doc(),
        functions,
    }
}

/// Describe a single member.
pub fn describe_member(proxy: &dyn ServiceProxy, member: &str) -> MemberOutcome {
    let omitted = |reason: String| MemberOutcome::Omitted {
        member: member.to_owned(),
        reason,
    };

    match proxy.metadata(member) {
        MemberMetadata::Unavailable(reason) => omitted(reason),
        MemberMetadata::Available(overloads) => match signatures(&overloads) {
            Ok(signatures) => MemberOutcome::Described(FunctionDescription {
                name: member.to_owned(),
                signatures,
            }),
            Err(reason) => omitted(reason),
        },
    }
}

/// One signature per declared argument list; fails on the first gap.
fn signatures(overloads: &Overloads) -> Result<Vec<Signature>, String> {
    overloads
        .arg_types
        .iter()
        .enumerate()
        .map(|(index, arg_types)| {
            let return_type = overloads
                .return_types
                .get(index)
                .ok_or_else(|| format!("no return type for overload {index}"))?;
            let arg_docs = overloads
                .docs
                .get(arg_types)
                .ok_or_else(|| format!("no documentation for ({})", arg_types.join(", ")))?;
            Ok(Signature {
                return_type: return_type.clone(),
                arg_types: arg_types.clone(),
                arg_docs: arg_docs.clone(),
            })
        })
        .collect()
}
