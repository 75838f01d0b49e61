use connascence::ast::{NodeKindSet, TraversalStats};
use connascence::{NodeKind, ParsedTree, TraversalConfig, TraversalVisitor};

/// One snippet per container category, each hiding targets inside it.
const CONTAINERS: &[(&str, &str)] = &[
    ("function", "def f(x=lambda: g()):\n    h(1)\n"),
    ("decorated", "@register(make())\ndef f():\n    pass\n"),
    ("async function", "async def f():\n    await g(2)\n"),
    ("class", "class A(Base, meta=pick()):\n    attr = compute(3)\n    def m(self):\n        return self.n()\n"),
    ("for", "for i in items():\n    use(i)\nelse:\n    done()\n"),
    ("async for", "async def f():\n    async for i in stream():\n        use(i)\n"),
    ("while", "while check():\n    step()\nelse:\n    finish()\n"),
    ("if", "if a():\n    b()\nelif c():\n    d()\nelse:\n    e()\n"),
    ("with", "with open_it() as f, lock():\n    f.read()\n"),
    ("async with", "async def f():\n    async with session() as s:\n        await s.get()\n"),
    ("try", "try:\n    risky()\nexcept ValueError as e:\n    handle(e)\nelse:\n    ok()\nfinally:\n    cleanup()\n"),
    ("try star", "try:\n    risky()\nexcept* ValueError:\n    handle()\n"),
    ("match", "match command():\n    case [x, y] if ok(x):\n        run(x, y)\n    case _:\n        fallback()\n"),
    ("comprehension", "values = [f(x) for x in g() if h(x)]\nlookup = {k: v() for k in keys()}\n"),
    ("lambda", "handler = lambda event: dispatch(event, lambda: 7)\n"),
    ("nested", "class A:\n    def m(self):\n        for i in x:\n            while i:\n                with c():\n                    try:\n                        if i:\n                            match i:\n                                case 1:\n                                    deep(lambda: 8)\n                    except E:\n                        pass\n"),
];

const TARGETS: &[NodeKind] = &[
    NodeKind::Call,
    NodeKind::Lambda,
    NodeKind::Constant,
    NodeKind::FunctionDef,
    NodeKind::ClassDef,
    NodeKind::Name,
    NodeKind::Await,
];

fn unpruned_count(tree: &ParsedTree, target: NodeKind) -> usize {
    let mut visitor = TraversalVisitor::default();
    visitor
        .traverse(tree.root(), NodeKindSet::all(), |node, _| node.kind())
        .into_iter()
        .filter(|(_, kind)| *kind == target)
        .count()
}

#[test]
fn test_pruning_never_hides_a_target() {
    for (category, source) in CONTAINERS {
        let tree = ParsedTree::parse(*source, "<pruning>").unwrap();
        for target in TARGETS {
            let mut visitor = TraversalVisitor::default();
            let found = visitor.collect(tree.root(), NodeKindSet::of(&[*target])).len();
            assert_eq!(
                found,
                unpruned_count(&tree, *target),
                "{} target lost inside {}",
                target,
                category
            );
        }
    }
}

#[test]
fn test_pruning_skips_work() {
    let source: String = CONTAINERS.iter().map(|(_, s)| *s).collect::<Vec<_>>().join("\n");
    let tree = ParsedTree::parse(source, "<pruning>").unwrap();

    let mut pruned = TraversalVisitor::default();
    pruned.collect(tree.root(), NodeKindSet::of(&[NodeKind::ClassDef]));
    let mut full = TraversalVisitor::default();
    full.collect(tree.root(), NodeKindSet::all());

    let (pruned, full): (TraversalStats, TraversalStats) = (pruned.stats(), full.stats());
    assert!(pruned.pruned > 0);
    assert!(pruned.visited < full.visited);
}

#[test]
fn test_depth_limit_applies_to_every_category() {
    for (category, source) in CONTAINERS {
        let tree = ParsedTree::parse(*source, "<pruning>").unwrap();
        let mut visitor = TraversalVisitor::new(TraversalConfig {
            max_depth: 0,
            ..TraversalConfig::default()
        });
        let found = visitor.collect(tree.root(), NodeKindSet::of(&[NodeKind::Call]));
        assert!(found.is_empty(), "depth limit ignored inside {}", category);
    }
}
