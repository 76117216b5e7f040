use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datascript::lexer::Lexer;
use datascript::parser::Parser;

const SMALL: &str = r#"declare x = 2 + 3 * 4;"#;

const MEDIUM: &str = r#"
schema Point {
    required x: number;
    required y: number;
    distanceTo(other) {
        declare dx = x - other.x;
        declare dy = y - other.y;
        return sqrt(dx * dx + dy * dy);
    }
}
declare origin = Point({ x: 0, y: 0 });
declare a = Point({ x: 3, y: 4 });
print(a.distanceTo(origin));
"#;

const LARGE: &str = r#"
schema Shape {
    required kind: string;
    area() { return 0; }
}

schema Circle extends Shape {
    required radius: number;
    area() { return 3.14159 * radius * radius; }
}

declare shapes = [Circle({ kind: "circle", radius: 1 }), Circle({ kind: "circle", radius: 2 })];
declare total = 0;
declare i = 0;
while (i < shapes.length) {
    total = total + shapes[i].area();
    i = i + 1;
}

try {
    if (total < 0) {
        throw "negative area";
    }
} catch (e) {
    print(e);
}

database ShapesDb = connect("memory://shapes");
collection Shapes;
use collection Shapes;
Shapes <- { kind: "circle", radius: 3 };
declare found = Shapes ? query { kind == "circle" };
"#;

fn lex_only(source: &str) {
    let mut lexer = Lexer::new(source);
    loop {
        let token = lexer.next_token().expect("lex error");
        if token.kind == datascript::lexer::TokenKind::Eof {
            break;
        }
    }
}

fn lex_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");
    for (name, source) in [("small", SMALL), ("medium", MEDIUM), ("large", LARGE)] {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &source, |b, source| {
            b.iter(|| lex_only(black_box(source)));
        });
    }
    group.finish();
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    for (name, source) in [("small", SMALL), ("medium", MEDIUM), ("large", LARGE)] {
        group.bench_with_input(BenchmarkId::new("parse_program", name), &source, |b, source| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(source)).expect("lex error");
                let program = parser.parse_program().expect("parse error");
                black_box(program)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, lex_benchmark, parse_benchmark);
criterion_main!(benches);
