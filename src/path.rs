//! UTF-8 path resolution over a volume's directory tree. See §4.8.

use crate::error::{ErrorKind, Result};
use crate::io_context::IoContext;
use crate::xfs::dir::Directory;
use crate::xfs::inode::{read_inode, Inode};

/// Symlinks are followed at most this many times while resolving a single path, to turn a
/// cyclic or absurdly long symlink chain into an error rather than an infinite loop.
const MAX_SYMLINK_DEPTH: u32 = 40;

fn split_components(path: &[u8]) -> Vec<&[u8]> {
    path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect()
}

/// Resolves a UTF-8 path against `root_inode`. Leading slashes (or their absence) are both
/// treated as starting from `root_inode`: relative paths are not meaningful at this API's
/// level. Returns `Ok(None)` for a genuine miss.
///
/// # Errors
///
/// Returns `SymlinkLoop` if resolution follows more than [`MAX_SYMLINK_DEPTH`] symlink hops.
/// Propagates decode and I/O errors from the inode/directory layers.
pub fn resolve(ctx: &IoContext, root_inode: u64, path: &[u8]) -> Result<Option<u64>> {
    resolve_components(ctx, root_inode, &split_components(path), false, 0)
}

/// Resolves `components` one at a time starting at directory `current_dir`, following a
/// symlink found on any component before continuing, except the final one when `follow_final`
/// is `false`. `depth` counts symlink hops taken so far across the whole resolution.
///
/// `follow_final` is `false` only for the outermost call (the public API never follows a
/// symlink named by the last path component); every nested call made while chasing a symlink's
/// own target passes `true`, since that component must yield a real directory for resolution of
/// the remaining outer components to continue.
fn resolve_components(
    ctx: &IoContext,
    mut current_dir: u64,
    components: &[&[u8]],
    follow_final: bool,
    depth: u32,
) -> Result<Option<u64>> {
    for (index, component) in components.iter().enumerate() {
        let is_last = index + 1 == components.len();

        let dir_inode = read_inode(ctx, current_dir)?;
        let directory = Directory::from_inode(&dir_inode)?;
        let Some(entry) = directory.lookup(ctx, component)? else {
            return Ok(None);
        };

        if is_last && !follow_final {
            return Ok(Some(entry.inode_number));
        }

        let entry_inode = read_inode(ctx, entry.inode_number)?;
        current_dir = if entry_inode.is_symlink() {
            match follow_symlink(ctx, current_dir, &entry_inode, depth)? {
                Some(target) => target,
                None => return Ok(None),
            }
        } else {
            entry.inode_number
        };
    }

    Ok(Some(current_dir))
}

/// Follows one symlink's target, itself resolving any further symlinks the target traverses.
/// `containing_dir` is the directory the symlink entry was found in, used as the base for a
/// relative (non-`/`-rooted) target.
fn follow_symlink(
    ctx: &IoContext,
    containing_dir: u64,
    symlink_inode: &Inode,
    depth: u32,
) -> Result<Option<u64>> {
    let next_depth = depth + 1;
    if next_depth > MAX_SYMLINK_DEPTH {
        return Err(ErrorKind::SymlinkLoop.into());
    }

    let target = symlink_target_bytes(ctx, symlink_inode)?;
    let components = split_components(&target);
    let base = if target.first() == Some(&b'/') {
        ctx.geometry().root_inode
    } else {
        containing_dir
    };
    resolve_components(ctx, base, &components, true, next_depth)
}

/// Reads the raw target bytes of a symlink inode, whether stored inline or in extents.
///
/// # Errors
///
/// Propagates I/O errors encountered reading an extent-backed symlink target.
pub fn symlink_target_bytes(ctx: &IoContext, inode: &Inode) -> Result<Vec<u8>> {
    crate::xfs::reader::read_range(ctx, &inode.data_fork, inode.size, 0, inode.size)
}
