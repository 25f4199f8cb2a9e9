// 上传模块
//
// - chunk: 输入切分
// - options: 上传参数解析与校验
// - orchestrator: 选号、上传、设置权限、写元数据
// - registry: 每个逻辑存储一个编排器

pub mod chunk;
pub mod options;
pub mod orchestrator;
pub mod registry;

pub use chunk::{read_single, ChunkSplitter, ChunkStream, MAX_CHUNK_SIZE};
pub use options::UploadOptions;
pub use orchestrator::{UploadOrchestrator, CHUNK_MIME_TYPE};
pub use registry::{StoreIdentity, UploaderRegistry};
