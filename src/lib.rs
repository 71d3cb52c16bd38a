// Library root
// -----------
// The binary (`main.rs`) wires these modules into the interactive uploader.
//
// Module responsibilities:
// - `config`: bucket/region/credentials from the environment or prompts.
// - `storage`: the `ObjectStore` seam and the upload data types.
// - `s3`: the AWS implementation of `ObjectStore`.
// - `body`: request bodies that report bytes as they are sent.
// - `uploader`: bucket operations with progress and error reporting.
// - `walk`: directory selection and object key construction.
// - `picker`, `prompt`, `output`: terminal capabilities behind traits.
// - `ui`: the menu-driven session.
pub mod body;
pub mod config;
pub mod error;
pub mod output;
pub mod picker;
pub mod prompt;
pub mod s3;
pub mod storage;
pub mod ui;
pub mod uploader;
pub mod walk;
