/*!
 * NUT - Network UPS Tools network protocol
 * https://networkupstools.org/docs/developer-guide.chunked/net-protocol.html
 */

pub mod token;
pub mod command;
pub mod reply;
pub mod parser;

pub use command::Request;
pub use parser::ReplyParser;
pub use reply::Reply;
pub use token::{quote, tokenize};
