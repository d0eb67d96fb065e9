//! Registration point for every Node-compat shim: one native entry point
//! (`__lifoCallSync`) plus the JS glue that turns it into `require`-able
//! module objects, `console`, `Buffer`, and a timer queue.

pub mod bridge;
pub mod buffer;
pub mod console;
pub mod dns;
pub mod fs;
pub mod http;
pub mod misc;
pub mod module;
pub mod os;
pub mod path;
pub mod process;
pub mod require;

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsNativeError, JsValue, NativeFunction, Source};

use bridge::HostBridge;

/// Install `__lifoCallSync` and every JS-side wrapper module into a fresh
/// context. Must run before any user script is evaluated.
pub fn install_all(context: &mut Context, bridge: HostBridge) {
    let bridge_cell = Rc::new(RefCell::new(bridge));

    let native = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, context| {
            let module = args
                .get(0)
                .cloned()
                .unwrap_or_default()
                .to_string(context)?
                .to_std_string_escaped();
            let method = args
                .get(1)
                .cloned()
                .unwrap_or_default()
                .to_string(context)?
                .to_std_string_escaped();
            let args_json_text = args
                .get(2)
                .cloned()
                .unwrap_or_default()
                .to_string(context)?
                .to_std_string_escaped();
            let args_json: serde_json::Value =
                serde_json::from_str(&args_json_text).unwrap_or(serde_json::Value::Null);

            let result = captures.borrow().call(&module, &method, args_json);
            match result {
                Ok(value) => {
                    let text = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
                    Ok(JsValue::from(js_string!(text.as_str())))
                }
                Err(message) => Err(JsNativeError::error().with_message(message).into()),
            }
        },
        bridge_cell,
    );

    let function_object = FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!("__lifoCallSync"))
        .length(3)
        .build();

    context
        .register_global_property(js_string!("__lifoCallSync"), function_object, Attribute::all())
        .expect("__lifoCallSync registration must succeed");

    for glue in [
        JS_CALL_PRELUDE,
        JS_TIMERS,
        JS_BUFFER,
        JS_CONSOLE,
        JS_FS,
        JS_PATH,
        JS_OS,
        JS_PROCESS,
        JS_HTTP,
        JS_DNS,
        JS_MODULE,
        JS_EVENTS,
        JS_MISC,
        JS_REQUIRE,
        JS_GLOBALS,
    ] {
        context
            .eval(Source::from_bytes(glue.as_bytes()))
            .unwrap_or_else(|e| panic!("node shim glue failed to evaluate: {e}"));
    }
}

/// The low-level bridge: JSON-encodes arguments, decodes the JSON result,
/// and re-throws a posix-shaped error object when the native call reports
/// `{code, errno, syscall, path, message}`.
const JS_CALL_PRELUDE: &str = r#"
(function() {
  globalThis.__lifoCall = function(mod, method, args) {
    var argsJson = JSON.stringify(args === undefined ? [] : args);
    var resultJson = __lifoCallSync(mod, method, argsJson);
    return resultJson === undefined ? undefined : JSON.parse(resultJson);
  };
  globalThis.__lifoRethrowPosix = function(e) {
    if (e && typeof e.message === "string") {
      try {
        var info = JSON.parse(e.message);
        if (info && info.code && info.syscall) {
          var err = new Error(info.message || (info.syscall + " '" + info.path + "': " + info.code));
          err.code = info.code;
          err.errno = info.errno;
          err.syscall = info.syscall;
          err.path = info.path;
          throw err;
        }
      } catch (parseErr) {
        if (parseErr !== e && parseErr.code) { throw parseErr; }
      }
    }
    throw e;
  };
  globalThis.__lifoModules = {};
})();
"#;

/// `setTimeout`/`setInterval` family, backed by a plain due-time queue the
/// executor drains by calling `__lifoPumpTimers(nowMs)` between turns --
/// there is no wall-clock thread inside the engine itself.
const JS_TIMERS: &str = r#"
(function() {
  var queue = [];
  var nextId = 1;
  function schedule(fn, delayMs, args, repeatMs) {
    var id = nextId++;
    queue.push({ id: id, due: delayMs, repeat: repeatMs, fn: fn, args: args, cancelled: false });
    return id;
  }
  globalThis.setTimeout = function(fn, delayMs) {
    return schedule(fn, delayMs || 0, Array.prototype.slice.call(arguments, 2), null);
  };
  globalThis.setInterval = function(fn, delayMs) {
    return schedule(fn, delayMs || 0, Array.prototype.slice.call(arguments, 2), delayMs || 0);
  };
  globalThis.clearTimeout = globalThis.clearInterval = function(id) {
    for (var i = 0; i < queue.length; i++) {
      if (queue[i].id === id) { queue[i].cancelled = true; }
    }
  };
  globalThis.__lifoPumpTimers = function(elapsedMs) {
    var ran = false;
    for (var i = 0; i < queue.length; i++) {
      var t = queue[i];
      if (t.cancelled) { continue; }
      t.due -= elapsedMs;
      if (t.due <= 0) {
        ran = true;
        t.fn.apply(null, t.args);
        if (t.repeat !== null && !t.cancelled) {
          t.due = t.repeat;
        } else {
          t.cancelled = true;
        }
      }
    }
    queue = queue.filter(function(t) { return !t.cancelled; });
    return ran;
  };
  globalThis.__lifoHasPendingTimers = function() {
    return queue.some(function(t) { return !t.cancelled; });
  };
})();
"#;

/// A `Buffer` class built on the `buffer` shim's base64/hex codecs. Content
/// is stored as a plain JS string; encodings other than utf8/base64/hex
/// round-trip through that string rather than a true byte array, which is
/// enough for scripts that hash, encode, or pass bodies through unmodified.
const JS_BUFFER: &str = r#"
(function() {
  function Buffer(text) { this.__data = text; }
  Buffer.prototype.toString = function(encoding) {
    encoding = encoding || "utf8";
    if (encoding === "utf8" || encoding === "utf-8") { return this.__data; }
    if (encoding === "base64") { return __lifoCall("buffer", "toBase64", [this.__data, "utf8"]); }
    if (encoding === "hex") { return __lifoCall("buffer", "toHex", [this.__data, "utf8"]); }
    return this.__data;
  };
  Object.defineProperty(Buffer.prototype, "length", {
    get: function() { return this.__data.length; },
  });
  Buffer.from = function(input, encoding) {
    if (input instanceof Buffer) { return input; }
    if (encoding === "base64") { return new Buffer(__lifoCall("buffer", "fromBase64", [input])); }
    if (encoding === "hex") { return new Buffer(__lifoCall("buffer", "fromHex", [input])); }
    return new Buffer(String(input));
  };
  Buffer.alloc = function(size, fill) {
    return new Buffer(new Array(size + 1).join(fill === undefined ? " " : String(fill)).slice(0, size));
  };
  Buffer.isBuffer = function(x) { return x instanceof Buffer; };
  Buffer.concat = function(list) {
    return new Buffer(list.map(function(b) { return b.toString("utf8"); }).join(""));
  };
  globalThis.Buffer = Buffer;
})();
"#;

const JS_CONSOLE: &str = r#"
(function() {
  function fmt(args) {
    return Array.prototype.map.call(args, function(a) {
      if (typeof a === "string") { return a; }
      try { return JSON.stringify(a); } catch (e) { return String(a); }
    }).join(" ");
  }
  globalThis.console = {
    log: function() { __lifoCall("console", "log", [fmt(arguments)]); },
    info: function() { __lifoCall("console", "info", [fmt(arguments)]); },
    debug: function() { __lifoCall("console", "debug", [fmt(arguments)]); },
    warn: function() { __lifoCall("console", "warn", [fmt(arguments)]); },
    error: function() { __lifoCall("console", "error", [fmt(arguments)]); },
  };
  globalThis.__lifoModules.console = globalThis.console;
})();
"#;

/// Synchronous, callback, and promise flavors of `fs`, all wrapping the
/// same native `readFileSync`-style calls -- there's no real I/O latency to
/// simulate, so "async" only means "doesn't run until the next queue drain".
const JS_FS: &str = r#"
(function() {
  function call(method, args) {
    try {
      return __lifoCall("fs", method, args);
    } catch (e) {
      __lifoRethrowPosix(e);
    }
  }
  function decode(value) {
    if (value && typeof value === "object" && value.__buffer__) {
      return Buffer.from(value.base64, "base64");
    }
    return value;
  }
  function encodeWrite(data) {
    if (data instanceof Buffer) { return { __buffer__: true, base64: data.toString("base64") }; }
    return String(data);
  }
  function statsFrom(raw) {
    return {
      size: raw.size, mtimeMs: raw.mtimeMs, ctimeMs: raw.ctimeMs, mode: raw.mode,
      isDirectory: function() { return raw.isDirectory; },
      isFile: function() { return raw.isFile; },
      isSymbolicLink: function() { return false; },
    };
  }
  var sync = {
    readFileSync: function(path, options) {
      var encoding = typeof options === "string" ? options : (options && options.encoding);
      return decode(call("readFileSync", [path, encoding]));
    },
    writeFileSync: function(path, data) { call("writeFileSync", [path, encodeWrite(data)]); },
    appendFileSync: function(path, data) { call("appendFileSync", [path, encodeWrite(data)]); },
    existsSync: function(path) { return call("existsSync", [path]); },
    statSync: function(path) { return statsFrom(call("statSync", [path])); },
    lstatSync: function(path) { return statsFrom(call("lstatSync", [path])); },
    readdirSync: function(path, options) { return call("readdirSync", [path, options]); },
    mkdirSync: function(path, options) { return call("mkdirSync", [path, options]); },
    rmdirSync: function(path, options) { call("rmdirSync", [path, options]); },
    unlinkSync: function(path) { call("unlinkSync", [path]); },
    renameSync: function(from, to) { call("renameSync", [from, to]); },
    copyFileSync: function(from, to) { call("copyFileSync", [from, to]); },
    realpathSync: function(path) { return call("realpathSync", [path]); },
    ftruncateSync: function(path, len) { call("ftruncateSync", [path, len]); },
  };
  var async_ = {};
  var promises = {};
  Object.keys(sync).forEach(function(name) {
    var asyncName = name.replace(/Sync$/, "");
    async_[asyncName] = function() {
      var args = Array.prototype.slice.call(arguments);
      var cb = args.pop();
      setTimeout(function() {
        try {
          var result = sync[name].apply(null, args);
          cb(null, result);
        } catch (e) {
          cb(e);
        }
      }, 0);
    };
    promises[asyncName] = function() {
      var args = Array.prototype.slice.call(arguments);
      return new Promise(function(resolve, reject) {
        setTimeout(function() {
          try { resolve(sync[name].apply(null, args)); } catch (e) { reject(e); }
        }, 0);
      });
    };
  });
  async_.promises = promises;
  async_.constants = { F_OK: 0, R_OK: 4, W_OK: 2, X_OK: 1 };
  Object.keys(sync).forEach(function(name) { async_[name] = sync[name]; });
  globalThis.__lifoModules.fs = async_;
})();
"#;

const JS_PATH: &str = r#"
(function() {
  function call(method, args) { return __lifoCall("path", method, args); }
  var path = {
    sep: "/",
    delimiter: ":",
    join: function() { return call("join", Array.prototype.slice.call(arguments)); },
    resolve: function() { return call("resolve", Array.prototype.slice.call(arguments)); },
    dirname: function(p) { return call("dirname", [p]); },
    basename: function(p, ext) { return call("basename", [p, ext]); },
    extname: function(p) { return call("extname", [p]); },
    normalize: function(p) { return call("normalize", [p]); },
    relative: function(from, to) { return call("relative", [from, to]); },
    parse: function(p) { return call("parse", [p]); },
    isAbsolute: function(p) { return call("isAbsolute", [p]); },
  };
  path.posix = path;
  globalThis.__lifoModules.path = path;
})();
"#;

const JS_OS: &str = r#"
(function() {
  function call(method) { return __lifoCall("os", method, []); }
  globalThis.__lifoModules.os = {
    hostname: function() { return call("hostname"); },
    platform: function() { return call("platform"); },
    arch: function() { return call("arch"); },
    tmpdir: function() { return call("tmpdir"); },
    homedir: function() { return call("homedir"); },
    cpus: function() { return call("cpus"); },
    type: function() { return call("type"); },
    release: function() { return call("release"); },
    totalmem: function() { return call("totalmem"); },
    freemem: function() { return call("freemem"); },
    EOL: call("eol"),
  };
})();
"#;

const JS_PROCESS: &str = r#"
(function() {
  function call(method, args) { return __lifoCall("process", method, args || []); }
  var listeners = {};
  var proc = {
    cwd: function() { return call("cwd"); },
    chdir: function(dir) { call("chdir", [dir]); },
    env: call("env"),
    argv: call("argv"),
    pid: call("pid"),
    platform: call("platform"),
    version: "v" + call("versions").node,
    versions: call("versions"),
    hrtime: function() { return call("hrtime"); },
    nextTick: function(fn) {
      var args = Array.prototype.slice.call(arguments, 1);
      Promise.resolve().then(function() { fn.apply(null, args); });
    },
    exit: function(code) {
      throw new Error("__LIFO_PROCESS_EXIT__:" + (code === undefined ? 0 : code));
    },
    on: function(name, fn) {
      listeners[name] = listeners[name] || [];
      listeners[name].push(fn);
      return proc;
    },
    stdout: { write: function(text) { __lifoCall("console", "log", [String(text).replace(/\n$/, "")]); return true; } },
    stderr: { write: function(text) { __lifoCall("console", "error", [String(text).replace(/\n$/, "")]); return true; } },
  };
  globalThis.process = proc;
  globalThis.__lifoModules.process = proc;
})();
"#;

const JS_HTTP: &str = r#"
(function() {
  var handlerSeq = 0;
  globalThis.__lifoHttpHandlers = {};
  globalThis.__lifoDispatch = function(handlerKey, req) {
    var entry = globalThis.__lifoHttpHandlers[handlerKey];
    if (!entry) { return { statusCode: 503, headers: {}, body: "no handler" }; }
    var responseBody = "";
    var statusCode = 200;
    var headers = {};
    var res = {
      statusCode: 200,
      setHeader: function(k, v) { headers[k] = v; },
      writeHead: function(code, h) { statusCode = code; if (h) { Object.assign(headers, h); } },
      write: function(chunk) { responseBody += chunk; },
      end: function(chunk) { if (chunk) { responseBody += chunk; } },
    };
    var request = {
      method: req.method, url: req.url, headers: req.headers || {},
      on: function(event, cb) {
        if (event === "data") { cb(req.body || ""); }
        if (event === "end") { cb(); }
        return request;
      },
    };
    entry(request, res);
    return { statusCode: statusCode, headers: headers, body: responseBody };
  };
  function createServer(handler) {
    var handlerKey = null;
    return {
      listen: function(port, cb) {
        handlerKey = "h" + (handlerSeq++);
        globalThis.__lifoHttpHandlers[handlerKey] = handler;
        __lifoCall("http", "listen", [port, handlerKey]);
        if (cb) { setTimeout(cb, 0); }
        return this;
      },
      close: function(cb) {
        __lifoCall("http", "close", [0]);
        if (cb) { setTimeout(cb, 0); }
      },
    };
  }
  globalThis.__lifoModules.http = {
    createServer: createServer,
    request: function(url, options, cb) {
      if (typeof options === "function") { cb = options; options = {}; }
      options = options || {};
      var body = "";
      var req = {
        write: function(chunk) { body += chunk; },
        end: function(chunk) {
          if (chunk) { body += chunk; }
          var result = __lifoCall("http", "request", [options.method || "GET", url, body]);
          if (cb) {
            var res = {
              statusCode: result.statusCode, headers: result.headers,
              on: function(event, handler) {
                if (event === "data") { handler(result.body); }
                if (event === "end") { handler(); }
                return res;
              },
            };
            setTimeout(function() { cb(res); }, 0);
          }
        },
        on: function() { return req; },
      };
      return req;
    },
    get: function(url, options, cb) {
      var req = globalThis.__lifoModules.http.request(url, options, cb);
      req.end();
      return req;
    },
  };
})();
"#;

const JS_DNS: &str = r#"
(function() {
  function call(method, args) { return __lifoCall("dns", method, args); }
  globalThis.__lifoModules.dns = {
    lookup: function(hostname, options, cb) {
      if (typeof options === "function") { cb = options; }
      setTimeout(function() {
        try { cb(null, call("lookup", [hostname]), 4); } catch (e) { cb(e); }
      }, 0);
    },
    resolve4: function(hostname, cb) {
      setTimeout(function() {
        try { cb(null, [call("resolve4", [hostname])]); } catch (e) { cb(e); }
      }, 0);
    },
    promises: {
      lookup: function(hostname) {
        return new Promise(function(resolve, reject) {
          setTimeout(function() {
            try { resolve({ address: call("lookup", [hostname]), family: 4 }); } catch (e) { reject(e); }
          }, 0);
        });
      },
    },
  };
})();
"#;

const JS_MODULE: &str = r#"
(function() {
  globalThis.__lifoModules.module = {
    builtinModules: __lifoCall("module", "builtinModules", []),
    isBuiltin: function(name) { return __lifoCall("module", "isBuiltin", [name]); },
  };
})();
"#;

/// Minimal `events`/`stream` classes. Neither needs a host call, so they're
/// plain prototype chains defined here rather than in Rust.
const JS_EVENTS: &str = r#"
(function() {
  function EventEmitter() { this.__listeners = {}; }
  EventEmitter.prototype.on = EventEmitter.prototype.addListener = function(event, fn) {
    (this.__listeners[event] = this.__listeners[event] || []).push(fn);
    return this;
  };
  EventEmitter.prototype.once = function(event, fn) {
    var self = this;
    function wrapper() { self.removeListener(event, wrapper); fn.apply(self, arguments); }
    return this.on(event, wrapper);
  };
  EventEmitter.prototype.removeListener = EventEmitter.prototype.off = function(event, fn) {
    var list = this.__listeners[event];
    if (list) { this.__listeners[event] = list.filter(function(f) { return f !== fn; }); }
    return this;
  };
  EventEmitter.prototype.emit = function(event) {
    var list = this.__listeners[event];
    if (!list || list.length === 0) { return false; }
    var args = Array.prototype.slice.call(arguments, 1);
    list.slice().forEach(function(fn) { fn.apply(null, args); });
    return true;
  };
  EventEmitter.prototype.listenerCount = function(event) {
    return (this.__listeners[event] || []).length;
  };
  globalThis.__lifoModules.events = { EventEmitter: EventEmitter };

  function Readable() { EventEmitter.call(this); }
  Readable.prototype = Object.create(EventEmitter.prototype);
  Readable.prototype.pipe = function(dest) {
    this.on("data", function(chunk) { dest.write(chunk); });
    this.on("end", function() { if (dest.end) { dest.end(); } });
    return dest;
  };
  function Writable() { EventEmitter.call(this); this.__chunks = []; }
  Writable.prototype = Object.create(EventEmitter.prototype);
  Writable.prototype.write = function(chunk) { this.__chunks.push(chunk); this.emit("data", chunk); return true; };
  Writable.prototype.end = function(chunk) { if (chunk !== undefined) { this.write(chunk); } this.emit("finish"); this.emit("end"); };
  globalThis.__lifoModules.stream = { Readable: Readable, Writable: Writable, EventEmitter: EventEmitter };
})();
"#;

const JS_MISC: &str = r#"
(function() {
  globalThis.__lifoModules.querystring = {
    stringify: function(obj) { return __lifoCall("misc", "qsStringify", [obj]); },
    parse: function(str) { return __lifoCall("misc", "qsParse", [str]); },
  };
  function LifoUrl(input) {
    var parsed = __lifoCall("misc", "urlParse", [input]);
    Object.assign(this, parsed);
  }
  globalThis.__lifoModules.url = {
    URL: LifoUrl,
    parse: function(input) { return __lifoCall("misc", "urlParse", [input]); },
  };
  globalThis.__lifoModules.crypto = {
    createHash: function(algorithm) {
      var chunks = [];
      return {
        update: function(data) { chunks.push(String(data)); return this; },
        digest: function(encoding) {
          var hex = __lifoCall("misc", "sha256Hex", [chunks.join("")]);
          if (encoding === "hex" || encoding === undefined) { return hex; }
          return Buffer.from(hex, "hex").toString(encoding);
        },
      };
    },
    randomBytes: function(size) {
      var hex = __lifoCall("misc", "sha256Hex", [String(Math.random ? Math.random() : size) + size]);
      return Buffer.from(hex.slice(0, size * 2), "hex");
    },
  };
  globalThis.__lifoModules.util = {
    inspect: function(value) { try { return JSON.stringify(value); } catch (e) { return String(value); } },
    format: function() {
      var args = Array.prototype.slice.call(arguments);
      return args.map(function(a) { return typeof a === "string" ? a : JSON.stringify(a); }).join(" ");
    },
    promisify: function(fn) {
      return function() {
        var args = Array.prototype.slice.call(arguments);
        var self = this;
        return new Promise(function(resolve, reject) {
          args.push(function(err, value) { if (err) { reject(err); } else { resolve(value); } });
          fn.apply(self, args);
        });
      };
    },
    deprecate: function(fn) { return fn; },
  };
  globalThis.__lifoModules.assert = function(value, message) {
    if (!value) { throw new Error(message || "assertion failed"); }
  };
  globalThis.__lifoModules.assert.strictEqual = function(a, b, message) {
    if (a !== b) { throw new Error(message || (a + " !== " + b)); }
  };
  globalThis.__lifoModules.timers = { setTimeout: setTimeout, setInterval: setInterval, clearTimeout: clearTimeout, clearInterval: clearInterval };
})();
"#;

/// `require`: resolves through the `require` bridge module (the one piece
/// that still needs the VFS), then runs the returned body through the
/// `Function` constructor with a fresh `exports`/`module` pair. The module
/// is registered in the cache *before* its body runs so a circular
/// `require` sees the in-progress (possibly still-empty) exports object
/// instead of recursing forever.
const JS_REQUIRE: &str = r#"
(function() {
  var cache = {};
  function lifoRequire(specifier, fromDir) {
    var info = __lifoCall("require", "load", [specifier, fromDir]);
    if (info.kind === "builtin") {
      return globalThis.__lifoModules[info.name] || {};
    }
    if (info.kind === "stub") {
      return {};
    }
    if (cache[info.path]) {
      return cache[info.path].exports;
    }
    var mod = { exports: {}, id: info.path, filename: info.path };
    cache[info.path] = mod;
    var childRequire = function(spec) { return lifoRequire(spec, info.dir); };
    childRequire.resolve = function(spec) { return spec; };
    childRequire.cache = cache;
    var fn = new Function(
      "exports", "require", "module", "__filename", "__dirname",
      "console", "process", "Buffer", "setTimeout", "setInterval", "clearTimeout", "clearInterval", "global",
      info.body
    );
    fn.call(
      mod.exports, mod.exports, childRequire, mod, info.path, info.dir,
      console, process, Buffer, setTimeout, setInterval, clearTimeout, clearInterval, globalThis
    );
    return mod.exports;
  }
  globalThis.__lifoRequire = lifoRequire;
})();
"#;

const JS_GLOBALS: &str = r#"
(function() {
  globalThis.globalThis = globalThis;
  globalThis.global = globalThis;
  if (!globalThis.queueMicrotask) {
    globalThis.queueMicrotask = function(fn) { Promise.resolve().then(fn); };
  }
})();
"#;
