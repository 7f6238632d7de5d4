//! Git access for template change detection

mod repo;

pub use repo::GitRepo;

#[cfg(test)]
pub(crate) use repo::tests::commit_file;
