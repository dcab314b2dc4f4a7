//! In-process fake server used by the integration tests.
//!
//! Understands a handful of real commands backed by a shared in-memory
//! store, plus two test hooks:
//!
//! - `REPLY <raw>` writes `<raw>` back verbatim,
//! - `HANGUP` closes the connection without replying.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{BufReader, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use indexmap::IndexMap;
use respite::{Connection, Decoder, TcpConnector, Value};

#[derive(Debug)]
enum Entry {
    Text(Vec<u8>),
    Hash(IndexMap<Vec<u8>, Vec<u8>>),
    Stream(Vec<(String, Vec<(Vec<u8>, Vec<u8>)>)>),
}

type Store = Arc<Mutex<HashMap<Vec<u8>, Entry>>>;

pub struct FakeServer {
    address: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let store = Store::default();

        let counter = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                let store = Arc::clone(&store);
                thread::spawn(move || serve(stream, store));
            }
        });

        Self { address, accepted }
    }

    pub fn address(&self) -> String {
        self.address.to_string()
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.address()).with_timeout(Duration::from_secs(1))
    }

    pub fn connect(&self) -> Connection<TcpStream> {
        Connection::open(&self.connector()).unwrap()
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, store: Store) {
    let mut writer = stream.try_clone().unwrap();
    let mut decoder = Decoder::new(BufReader::new(stream));

    while let Ok(request) = decoder.decode_value() {
        let Ok(args) = request
            .into_array()
            .and_then(|items| items.into_iter().map(Value::into_bulk).collect::<Result<Vec<_>, _>>())
        else {
            break;
        };
        let args = args.iter().map(|arg| arg.to_vec()).collect::<Vec<_>>();

        let Some(reply) = handle(&args, &store) else {
            break;
        };
        if writer.write_all(&reply).is_err() {
            break;
        }
    }
}

fn handle(args: &[Vec<u8>], store: &Store) -> Option<Vec<u8>> {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let args = &args[1..];
    let mut store = store.lock().unwrap();

    let reply = match (name.as_str(), args) {
        ("HANGUP", _) => return None,
        ("REPLY", [raw]) => raw.clone(),
        ("PING", []) => b"+PONG\r\n".to_vec(),
        ("ECHO", [message]) => bulk(message),
        ("SET", [key, value]) => {
            store.insert(key.clone(), Entry::Text(value.clone()));
            b"+OK\r\n".to_vec()
        }
        ("GET", [key]) => match store.get(key) {
            None => b"$-1\r\n".to_vec(),
            Some(Entry::Text(value)) => bulk(value),
            Some(_) => wrong_type(),
        },
        ("DEL", keys) if !keys.is_empty() => {
            integer(keys.iter().filter(|key| store.remove(*key).is_some()).count() as i64)
        }
        ("EXISTS", keys) if !keys.is_empty() => {
            integer(keys.iter().filter(|key| store.contains_key(*key)).count() as i64)
        }
        ("INCR", [key]) => incr_by(&mut store, key, b"1"),
        ("INCRBY", [key, delta]) => incr_by(&mut store, key, delta),
        ("HSET", [key, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
            let entry = store
                .entry(key.clone())
                .or_insert_with(|| Entry::Hash(IndexMap::new()));
            let Entry::Hash(hash) = entry else {
                return Some(wrong_type());
            };
            let added = rest
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count();
            integer(added as i64)
        }
        ("HGETALL", [key]) => match store.get(key) {
            None => b"*0\r\n".to_vec(),
            Some(Entry::Hash(hash)) => {
                let mut reply = format!("*{}\r\n", hash.len() * 2).into_bytes();
                for (field, value) in hash {
                    reply.extend(bulk(field));
                    reply.extend(bulk(value));
                }
                reply
            }
            Some(_) => wrong_type(),
        },
        ("XADD", [key, id, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
            let entry = store
                .entry(key.clone())
                .or_insert_with(|| Entry::Stream(Vec::new()));
            let Entry::Stream(entries) = entry else {
                return Some(wrong_type());
            };
            let id = match id.as_slice() {
                b"*" => format!("{}-0", entries.len() + 1),
                explicit => String::from_utf8_lossy(explicit).into_owned(),
            };
            let fields = rest
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            entries.push((id.clone(), fields));
            bulk(id.as_bytes())
        }
        ("XRANGE", [key, _, _]) => match store.get(key) {
            None => b"*0\r\n".to_vec(),
            Some(Entry::Stream(entries)) => {
                let mut reply = format!("*{}\r\n", entries.len()).into_bytes();
                for (id, fields) in entries {
                    reply.extend(b"*2\r\n");
                    reply.extend(bulk(id.as_bytes()));
                    reply.extend(format!("*{}\r\n", fields.len() * 2).into_bytes());
                    for (field, value) in fields {
                        reply.extend(bulk(field));
                        reply.extend(bulk(value));
                    }
                }
                reply
            }
            Some(_) => wrong_type(),
        },
        ("ARGS", args) => {
            let mut reply = format!("*{}\r\n", args.len()).into_bytes();
            for arg in args {
                reply.extend(bulk(arg));
            }
            reply
        }
        (name, _) => format!("-ERR unknown command '{name}'\r\n").into_bytes(),
    };
    Some(reply)
}

fn incr_by(store: &mut HashMap<Vec<u8>, Entry>, key: &[u8], delta: &[u8]) -> Vec<u8> {
    let current = match store.get(key) {
        None => Some(0),
        Some(Entry::Text(value)) => parse(value),
        Some(_) => return wrong_type(),
    };
    match (current, parse(delta)) {
        (Some(current), Some(delta)) => {
            let next = current + delta;
            store.insert(key.to_vec(), Entry::Text(next.to_string().into_bytes()));
            integer(next)
        }
        _ => b"-ERR value is not an integer or out of range\r\n".to_vec(),
    }
}

fn parse(text: &[u8]) -> Option<i64> {
    std::str::from_utf8(text).ok()?.parse().ok()
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut reply = format!("${}\r\n", data.len()).into_bytes();
    reply.extend_from_slice(data);
    reply.extend_from_slice(b"\r\n");
    reply
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

fn wrong_type() -> Vec<u8> {
    b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec()
}
