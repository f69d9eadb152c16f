//! CLI command implementations.
//!
//! | Module   | Commands handled                           |
//! |----------|--------------------------------------------|
//! | `issue`  | `SolveIssue`, `Analyze`, `PrCreator`       |
//! | `branch` | `BranchManager`                            |
//! | `ops`    | `Backup`, `Restore`, `Cron`, `Ssl`, `Verify` |

pub mod branch;
pub mod issue;
pub mod ops;

pub use branch::cmd_branch;
pub use issue::{cmd_analyze, cmd_pr_creator, cmd_solve_issue};
pub use ops::{cmd_backup, cmd_cron, cmd_restore, cmd_ssl, cmd_verify};
