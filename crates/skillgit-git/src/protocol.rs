//! Git HTTP protocol responses.
//!
//! Covers the dumb protocol (`info/refs`, `HEAD`, loose objects) and the
//! fetch side of the smart protocol (ref advertisement and upload-pack).
//! See: https://git-scm.com/docs/http-protocol

use crate::builder::{GitPack, HEAD_REF, MAIN_REF};
use crate::object::{GitObject, ObjectId};
use crate::pack::generate_packfile;
use crate::pktline::{write_sideband, Band, PktLineWriter};
use crate::request::UploadPackRequest;
use crate::Result;

/// The only service this server offers.
pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";

/// Capabilities advertised on the first ref line.
///
/// `thin-pack` and `ofs-delta` are advertised although packs only ever
/// contain whole objects; clients accept a pack without deltas.
pub const CAPABILITIES: &str = concat!(
    "multi_ack_detailed side-band-64k thin-pack ofs-delta shallow no-progress ",
    "symref=HEAD:refs/heads/main agent=skillgit/",
    env!("CARGO_PKG_VERSION")
);

/// Dumb protocol `info/refs`: one `"{sha}\t{ref}\n"` line per ref, HEAD
/// excluded.
pub fn generate_info_refs(pack: &GitPack) -> String {
    pack.refs
        .iter()
        .filter(|(name, _)| name.as_str() != HEAD_REF)
        .map(|(name, id)| format!("{}\t{}\n", id, name))
        .collect()
}

/// Contents of the dumb protocol `HEAD` file.
pub fn generate_head() -> String {
    format!("ref: {}\n", MAIN_REF)
}

/// The `# service=...` packet and flush that open a smart `info/refs`
/// response.
pub fn service_announcement(service: &str) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line(&format!("# service={}", service))?;
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Smart protocol ref advertisement for `git-upload-pack`.
///
/// HEAD comes first and carries the capabilities, the remaining refs follow
/// and the symref target closes the list before the flush.
pub fn generate_smart_info_refs(pack: &GitPack) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());

    let mut first = format!("{} {}", pack.head_commit, HEAD_REF).into_bytes();
    first.push(0);
    first.extend_from_slice(CAPABILITIES.as_bytes());
    first.push(b'\n');
    writer.write_data(&first)?;

    for (name, id) in &pack.refs {
        if name != HEAD_REF && name != MAIN_REF {
            writer.write_line(&format!("{} {}", id, name))?;
        }
    }

    let target = pack.refs.get(MAIN_REF).unwrap_or(&pack.head_commit);
    writer.write_line(&format!("{} {}", target, MAIN_REF))?;

    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

/// Shallow list sent back for a depth-limited request: the head commit is
/// the only boundary, followed by a flush.
pub fn generate_shallow_update(pack: &GitPack) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    write_shallow_update(&mut writer, pack)?;
    Ok(writer.into_inner())
}

fn write_shallow_update(writer: &mut PktLineWriter<Vec<u8>>, pack: &GitPack) -> Result<()> {
    writer.write_line(&format!("shallow {}", pack.head_commit))?;
    writer.flush_pkt()
}

/// Response body for `git-upload-pack`.
///
/// Shallow requests get a shallow section first. No negotiation happens:
/// the server never shares history with the client, so it always answers
/// NAK and sends the whole repository over side-band 1.
pub fn generate_upload_pack_response(pack: &GitPack, shallow: bool) -> Result<Vec<u8>> {
    let packfile = generate_packfile(pack)?;
    let mut writer = PktLineWriter::new(Vec::with_capacity(packfile.len() + 64));

    if shallow {
        write_shallow_update(&mut writer, pack)?;
    }

    writer.write_line("NAK")?;
    write_sideband(&mut writer, Band::PackData, &packfile)?;
    writer.flush_pkt()?;

    tracing::debug!(
        head = %pack.head_commit,
        shallow,
        pack_bytes = packfile.len(),
        "generated upload-pack response"
    );

    Ok(writer.into_inner())
}

/// Answers one round of a stateless upload-pack exchange.
///
/// Over HTTP a depth-limited fetch takes two requests. The first carries
/// `deepen` without `done` and expects nothing but the shallow list; the
/// pack follows only once the client sends `done`.
pub fn respond_to_upload_pack(pack: &GitPack, request: &UploadPackRequest) -> Result<Vec<u8>> {
    if request.is_shallow() && !request.done {
        tracing::debug!(head = %pack.head_commit, "sent shallow update");
        return generate_shallow_update(pack);
    }
    generate_upload_pack_response(pack, request.is_shallow())
}

/// Looks up an object by its 40-character hex id.
pub fn get_object<'a>(pack: &'a GitPack, sha: &str) -> Option<&'a GitObject> {
    let id = ObjectId::from_hex(sha).ok()?;
    pack.objects.get(&id)
}

/// Extracts the object id from a dumb protocol path such as
/// `objects/ab/cdef...`. A leading `/` is accepted.
pub fn parse_object_path(path: &str) -> Option<String> {
    let rest = path.trim_start_matches('/').strip_prefix("objects/")?;
    let (dir, file) = rest.split_once('/')?;

    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
    if dir.len() != 2 || file.len() != 38 || !is_hex(dir) || !is_hex(file) {
        return None;
    }

    Some(format!("{}{}", dir, file).to_ascii_lowercase())
}
