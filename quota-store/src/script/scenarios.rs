//! Built-in capacity bookkeeping scenarios
//!
//! Every scenario starts from an empty store and must leave it empty with no
//! remaining capacity.

use crate::store::QuotaFileStore;

use super::{ScriptError, ScriptRunner};

pub struct Scenario {
    pub name: &'static str,
    pub script: &'static str,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "requests capacity",
        script: "
request 1024
expect-remaining 1024
release 1024
",
    },
    Scenario {
        name: "does not count unwritten files toward capacity",
        script: "
request 1024
open unwritten
close unwritten
open unwritten
close unwritten
expect-remaining 1024
delete unwritten
release 1024
",
    },
    Scenario {
        name: "counts files with length toward capacity",
        script: "
request 1024
open sized
set-length sized 1024
close sized
expect-remaining 0
expect-fail release 1
delete sized
expect-remaining 1024
release 1024
",
    },
    Scenario {
        name: "accounts for written capacity (start of file)",
        script: "
request 1024
open start
write start 0 512 0xDD
expect-length start 512
close start
expect-remaining 512
delete start
expect-remaining 1024
release 1024
",
    },
    Scenario {
        name: "accounts for written capacity (end of file)",
        script: "
request 1024
open sparse
write sparse 512 512 0xDD
expect-remaining 0
expect-read sparse 512 512 0xDD
expect-read sparse 0 512 0x00
close sparse
delete sparse
expect-remaining 1024
release 1024
",
    },
    Scenario {
        name: "short reads past end of file",
        script: "
request 16
open short
write short 0 8 0x11
expect-read short 4 4 0x11
read short 8 8
read short 100 8
close short
delete short
release 16
",
    },
    Scenario {
        name: "rename keeps content and accounting",
        script: "
request 64
open before
write before 0 64 0x7F
close before
rename before after
expect-files after
expect-remaining 0
open after
expect-read after 0 64 0x7F
close after
expect-fail rename missing other
delete after
release 64
",
    },
    Scenario {
        name: "failed growth leaves the ledger unchanged",
        script: "
request 100
open tight
write tight 0 60 0x01
expect-fail write tight 50 60 0x02
expect-fail set-length tight 101
expect-length tight 60
expect-remaining 40
set-length tight 0
close tight
delete tight
release 100
",
    },
];

impl Scenario {
    /// Run against a fresh store and check it ends empty
    pub async fn run(&self) -> Result<Vec<String>, ScriptError> {
        let mut runner = ScriptRunner::new(QuotaFileStore::new());
        let mut output = runner.run(self.script).await?;
        output.extend(runner.run("expect-files\nexpect-remaining 0\n").await?);
        Ok(output)
    }
}
